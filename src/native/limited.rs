use std::time::Duration;

use crate::{
    core::{
        domain::ExecutionResult,
        traits::sandbox::{RunSpec, Sandbox, SandboxError},
    },
    native::process::{MemoryPolicy, ProcessConfig, classify, run_process},
};

/// Subprocess under rlimits with a peak RSS watcher.
///
/// `RLIMIT_AS` only catches runaway allocations; the watcher samples
/// `/proc/<pid>/status` every `poll_interval` and kills the process group as
/// soon as resident memory crosses `memory_limit_kb`. Core dumps are
/// disabled. A memory limit of 0 leaves memory unbounded but still measured.
#[derive(Clone, Debug)]
pub struct LimitedSandbox {
    config: ProcessConfig,
    poll_interval: Duration,
}

impl LimitedSandbox {
    pub fn new(config: ProcessConfig, poll_interval: Duration) -> Self {
        LimitedSandbox {
            config,
            poll_interval,
        }
    }
}

#[async_trait::async_trait]
impl Sandbox for LimitedSandbox {
    #[tracing::instrument(skip_all, fields(
        time_limit_ms = spec.limits.time_limit_ms,
        memory_limit_kb = spec.limits.memory_limit_kb,
    ))]
    async fn run(&self, spec: &RunSpec) -> Result<ExecutionResult, SandboxError> {
        let policy = MemoryPolicy {
            limit_kb: spec.limits.memory_limit_kb,
            poll_interval: self.poll_interval,
        };

        let raw = run_process(&self.config, spec, Some(policy)).await?;
        let result = classify(
            raw,
            &self.config.syntax_error_markers,
            Some(spec.limits.memory_limit_kb),
        );
        tracing::debug!(
            "Run finished with {:?} in {} ms, peak {} KB",
            result.status,
            result.execution_time_ms,
            result.memory_used_kb
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::MEMORY_LIMIT_EXCEEDED_OUTPUT,
        core::domain::{ExecutionLimits, ExecutionStatus},
        native::process::tests::python_config,
    };

    fn spec(code: &str, memory_limit_kb: u64) -> RunSpec {
        RunSpec {
            code: code.to_string(),
            input: String::new(),
            limits: ExecutionLimits {
                time_limit_ms: 5000,
                memory_limit_kb,
            },
        }
    }

    #[tokio::test]
    async fn test_reports_peak_memory() {
        let root = tempfile::tempdir().unwrap();
        let Some(config) = python_config(root.path()) else {
            return;
        };
        let sandbox = LimitedSandbox::new(config, Duration::from_millis(5));

        let code = "import time\nblob = b\"x\" * (32 * 1024 * 1024)\ntime.sleep(0.3)\nprint(len(blob))";
        let result = sandbox.run(&spec(code, 262_144)).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "33554432\n");
        assert!(result.memory_used_kb >= 32 * 1024);
    }

    #[tokio::test]
    async fn test_memory_hog_is_stopped() {
        let root = tempfile::tempdir().unwrap();
        let Some(config) = python_config(root.path()) else {
            return;
        };
        let sandbox = LimitedSandbox::new(config, Duration::from_millis(5));

        let code = "import time\nchunks = []\nwhile True:\n    chunks.append(b\"x\" * (8 * 1024 * 1024))\n    time.sleep(0.01)";
        let result = sandbox.run(&spec(code, 65_536)).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::MemoryLimitExceeded);
        assert_eq!(result.output, MEMORY_LIMIT_EXCEEDED_OUTPUT);
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_small_program_is_unaffected() {
        let root = tempfile::tempdir().unwrap();
        let Some(config) = python_config(root.path()) else {
            return;
        };
        let sandbox = LimitedSandbox::new(config, Duration::from_millis(10));

        let result = sandbox.run(&spec("print(sum(range(10)))", 65_536)).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "45\n");
        assert!(result.memory_used_kb <= 65_536);
    }
}
