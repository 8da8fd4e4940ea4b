use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use warm_gate_core::contract::{InvocationEvent, ProxyResponse};

use crate::error::HostError;

/// The request-processing host that runs the application itself.
///
/// `cancel` fires at the soft deadline. Implementations should stop work and
/// answer promptly once it does; how the timeout surfaces is up to them.
#[async_trait]
pub trait BackingHost: Send + Sync {
    async fn handle(
        &self,
        event: InvocationEvent,
        cancel: CancellationToken,
    ) -> Result<ProxyResponse, HostError>;
}
