use crate::core::domain::{ExecutionLimits, ExecutionResult};

/// One untrusted program execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSpec {
    pub code: String,
    pub input: String,
    pub limits: ExecutionLimits,
}

/// Failures of the judge itself. Anything the submitted code does wrong is
/// reported through [`ExecutionResult::status`] instead, so callers may retry
/// these but must never turn them into a user-facing verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to prepare scratch directory: {msg}")]
    ScratchDir { msg: String },
    #[error("failed to spawn interpreter: {msg}")]
    Spawn { msg: String },
    #[error("failed to wait for process: {msg}")]
    Wait { msg: String },
    #[error("failed to collect process output: {msg}")]
    Io { msg: String },
}

/// Runs a single program once, bounded by its limits.
///
/// Dropping the returned future must kill every process the run started and
/// remove its scratch directory; cancellation relies on that.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Sandbox: std::fmt::Debug + Send + Sync {
    async fn run(&self, spec: &RunSpec) -> Result<ExecutionResult, SandboxError>;
}
