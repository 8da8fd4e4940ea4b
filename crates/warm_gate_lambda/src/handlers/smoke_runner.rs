use std::sync::Arc;

use warm_gate_core::contract::LifecycleStatus;
use warm_gate_core::smoke::{
    aggregate_status, ProbeOutcome, ProbeRequest, ProbeResponse, SmokeTest, TargetMode,
};

use crate::adapters::probe::ProbeTransport;
use crate::error::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeRunReport {
    pub status: LifecycleStatus,
    pub outcomes: Vec<ProbeOutcome>,
}

impl SmokeRunReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.passed).count()
    }
}

/// Replays a smoke-test manifest against the candidate function or the live
/// endpoint. Every test runs even after an earlier one failed.
#[derive(Default)]
pub struct SmokeTestRunner {
    direct: Option<Arc<dyn ProbeTransport>>,
    public_endpoint: Option<Arc<dyn ProbeTransport>>,
}

impl SmokeTestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, mode: TargetMode, transport: Arc<dyn ProbeTransport>) -> Self {
        match mode {
            TargetMode::Direct => self.direct = Some(transport),
            TargetMode::PublicEndpoint => self.public_endpoint = Some(transport),
        }
        self
    }

    pub fn supports(&self, mode: TargetMode) -> bool {
        self.transport(mode).is_some()
    }

    fn transport(&self, mode: TargetMode) -> Option<&Arc<dyn ProbeTransport>> {
        match mode {
            TargetMode::Direct => self.direct.as_ref(),
            TargetMode::PublicEndpoint => self.public_endpoint.as_ref(),
        }
    }

    pub async fn run(&self, tests: &[SmokeTest], mode: TargetMode) -> SmokeRunReport {
        let mut outcomes = Vec::with_capacity(tests.len());

        for test in tests {
            let request = ProbeRequest::for_test(test, mode);
            let outcome = match self.probe(test, &request, mode).await {
                Ok(passed) => ProbeOutcome::matched(&request, passed),
                Err(error) => ProbeOutcome::errored(&request, error.to_string()),
            };

            if outcome.passed {
                tracing::info!(
                    component = "smoke_runner",
                    event = "probe_passed",
                    mode = mode.as_str(),
                    method = %outcome.method,
                    path = %outcome.path,
                );
            } else {
                tracing::warn!(
                    component = "smoke_runner",
                    event = "probe_failed",
                    mode = mode.as_str(),
                    method = %outcome.method,
                    path = %outcome.path,
                    pattern = %test.response_pattern,
                    error = outcome.error.as_deref().unwrap_or("response did not match"),
                );
            }
            outcomes.push(outcome);
        }

        let report = SmokeRunReport {
            status: aggregate_status(&outcomes),
            outcomes,
        };
        tracing::info!(
            component = "smoke_runner",
            event = "run_completed",
            mode = mode.as_str(),
            status = %report.status,
            tests = report.outcomes.len(),
            failed = report.failed_count(),
        );
        report
    }

    async fn probe(
        &self,
        test: &SmokeTest,
        request: &ProbeRequest,
        mode: TargetMode,
    ) -> Result<bool, ProbeError> {
        let transport = self.transport(mode).ok_or_else(|| {
            ProbeError::InvalidRequest(format!("no probe transport for {}", mode.as_str()))
        })?;
        let response = transport.send(request).await?;
        tracing::debug!(
            component = "smoke_runner",
            event = "probe_response",
            path = %request.path,
            body = %response.body,
        );
        Ok(response.matches(&test.response_pattern)?)
    }
}
