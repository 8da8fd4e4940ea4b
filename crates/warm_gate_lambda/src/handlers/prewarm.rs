use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use warm_gate_core::budget::soft_deadline;
use warm_gate_core::contract::InvocationEvent;

use crate::adapters::invoke::{FunctionInvoker, InvokeRequest};

/// Outcome of one fan-out. Individual failures never fail the fan-out itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrewarmSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Invocations still running when the join timeout elapsed.
    pub abandoned: usize,
}

/// Keeps sibling execution environments busy at the same time so the platform
/// has to provision `count` extra instances.
pub struct Prewarmer {
    invoker: Arc<dyn FunctionInvoker>,
    target_function: String,
    join_timeout: Duration,
}

impl Prewarmer {
    pub fn new(
        invoker: Arc<dyn FunctionInvoker>,
        target_function: impl Into<String>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            target_function: target_function.into(),
            join_timeout,
        }
    }

    /// Wait for the invocations for at most the join timeout, and never past
    /// the soft deadline of `remaining_budget`.
    pub async fn prewarm(&self, count: usize, remaining_budget: Duration) -> PrewarmSummary {
        let mut summary = PrewarmSummary {
            requested: count,
            ..PrewarmSummary::default()
        };
        if count == 0 {
            return summary;
        }

        let payload = match serde_json::to_vec(&InvocationEvent::keep_alive()) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(
                    component = "prewarmer",
                    event = "payload_serialization_failed",
                    error = %error,
                );
                summary.failed = count;
                return summary;
            }
        };

        let wait = self.join_timeout.min(soft_deadline(remaining_budget));

        tracing::info!(
            component = "prewarmer",
            event = "fan_out_started",
            target_function = %self.target_function,
            count,
            wait_ms = wait.as_millis() as u64,
        );

        let mut pending = (0..count)
            .map(|index| {
                let request = InvokeRequest::new(self.target_function.clone(), payload.clone());
                let invoker = Arc::clone(&self.invoker);
                async move { (index, invoker.invoke(request).await) }
            })
            .collect::<FuturesUnordered<_>>();

        let deadline = tokio::time::sleep(wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((_, Ok(_))) => summary.succeeded += 1,
                    Some((index, Err(error))) => {
                        summary.failed += 1;
                        tracing::warn!(
                            component = "prewarmer",
                            event = "invocation_failed",
                            index,
                            error = %error,
                        );
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    summary.abandoned = pending.len();
                    tracing::warn!(
                        component = "prewarmer",
                        event = "join_timeout",
                        abandoned = summary.abandoned,
                        waited_ms = wait.as_millis() as u64,
                    );
                    break;
                }
            }
        }

        tracing::info!(
            component = "prewarmer",
            event = "fan_out_completed",
            succeeded = summary.succeeded,
            failed = summary.failed,
            abandoned = summary.abandoned,
        );
        summary
    }
}
