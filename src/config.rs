use std::{path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::{
    constants::RETRY_BACKOFF_MS,
    core::{domain::ExecutionLimits, pipeline::workers::WorkerSettings},
    native::process::ProcessConfig,
};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// Plain subprocess with a wall-clock deadline.
    Native,
    /// Subprocess under rlimits with RSS measurement.
    Limited,
    /// Wiring checks only. Every run succeeds with empty output after a short
    /// delay and no code is executed, so real submissions end up as wrong
    /// answers. Never use it to judge.
    Stub,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    pub kind: SandboxKind,
    pub interpreter: PathBuf,
    pub source_file_name: String,
    pub scratch_root: PathBuf,
    pub syntax_error_markers: Vec<String>,
    pub memory_poll_interval_ms: u64,
}

impl SandboxConfig {
    pub fn process_config(&self) -> ProcessConfig {
        ProcessConfig {
            interpreter: self.interpreter.clone(),
            source_file_name: self.source_file_name.clone(),
            scratch_root: self.scratch_root.clone(),
            syntax_error_markers: self.syntax_error_markers.clone(),
        }
    }

    pub fn memory_poll_interval(&self) -> Duration {
        Duration::from_millis(self.memory_poll_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub default_time_limit_ms: u64,
    pub default_memory_limit_kb: u64,
    pub max_output_bytes: usize,
}

impl LimitsConfig {
    pub fn defaults(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.default_time_limit_ms,
            memory_limit_kb: self.default_memory_limit_kb,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub max_infra_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub limits: LimitsConfig,
    pub workers: WorkersConfig,
}

impl AppConfig {
    /// Defaults, then the optional file named by `JUDGECORE_CONFIG`, then
    /// `JUDGECORE__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("JUDGECORE_CONFIG").unwrap_or_else(|_| "config/judgecore".to_string());
        Self::load_from(&config_path)
    }

    fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let scratch_root = std::env::temp_dir().join("judgecore");
        let concurrency = std::thread::available_parallelism().map_or(1, |n| n.get());

        let s = Config::builder()
            .set_default("server.addr", "0.0.0.0:8080")?
            .set_default("sandbox.kind", "native")?
            .set_default("sandbox.interpreter", "python3")?
            .set_default("sandbox.source_file_name", "solution.py")?
            .set_default("sandbox.scratch_root", scratch_root.to_string_lossy().into_owned())?
            .set_default(
                "sandbox.syntax_error_markers",
                vec!["SyntaxError", "IndentationError"],
            )?
            .set_default("sandbox.memory_poll_interval_ms", 10_i64)?
            .set_default("limits.default_time_limit_ms", 2000_i64)?
            .set_default("limits.default_memory_limit_kb", 262_144_i64)?
            .set_default("limits.max_output_bytes", 65_536_i64)?
            .set_default("workers.concurrency", concurrency as i64)?
            .set_default("workers.queue_capacity", 128_i64)?
            .set_default("workers.max_infra_retries", 3_i64)?
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("JUDGECORE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sandbox.syntax_error_markers"),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.workers.concurrency,
            max_infra_retries: self.workers.max_infra_retries.max(1),
            max_output_bytes: self.limits.max_output_bytes,
            retry_backoff: Duration::from_millis(RETRY_BACKOFF_MS),
        }
    }
}
