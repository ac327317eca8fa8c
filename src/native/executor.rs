use crate::{
    core::{
        domain::ExecutionResult,
        traits::sandbox::{RunSpec, Sandbox, SandboxError},
    },
    native::process::{ProcessConfig, classify, run_process},
};

/// Bare subprocess with a wall-clock deadline. Memory is neither enforced
/// nor measured, so it is always reported as 0.
#[derive(Clone, Debug)]
pub struct NativeSandbox {
    config: ProcessConfig,
}

impl NativeSandbox {
    pub fn new(config: ProcessConfig) -> Self {
        NativeSandbox { config }
    }
}

#[async_trait::async_trait]
impl Sandbox for NativeSandbox {
    #[tracing::instrument(skip_all, fields(time_limit_ms = spec.limits.time_limit_ms))]
    async fn run(&self, spec: &RunSpec) -> Result<ExecutionResult, SandboxError> {
        let raw = run_process(&self.config, spec, None).await?;
        let result = classify(raw, &self.config.syntax_error_markers, None);
        tracing::debug!(
            "Run finished with {:?} in {} ms",
            result.status,
            result.execution_time_ms
        );
        Ok(result)
    }
}
