use std::time::Duration;

use crate::core::{
    domain::ExecutionResult,
    traits::sandbox::{RunSpec, Sandbox, SandboxError},
};

/// Returns the same result for every run after a fixed delay.
#[derive(Debug, Clone)]
pub struct SandboxStub {
    result: Result<ExecutionResult, SandboxError>,
    delay: Duration,
}

impl SandboxStub {
    pub fn new(result: Result<ExecutionResult, SandboxError>, delay: Duration) -> Self {
        Self { result, delay }
    }
}

#[async_trait::async_trait]
impl Sandbox for SandboxStub {
    #[tracing::instrument(skip_all)]
    async fn run(&self, spec: &RunSpec) -> Result<ExecutionResult, SandboxError> {
        tracing::debug!(
            "Start execution: input={:?}, limits={:?}",
            spec.input,
            spec.limits
        );
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution result: {:?}", self.result);

        self.result.clone()
    }
}
