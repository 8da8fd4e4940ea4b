use async_trait::async_trait;
use warm_gate_core::contract::{DeploymentHookEvent, LifecycleStatus};

use crate::error::ReportError;

/// Reports the outcome of a lifecycle hook to the deployment orchestrator.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(
        &self,
        event: &DeploymentHookEvent,
        status: LifecycleStatus,
    ) -> Result<(), ReportError>;
}
