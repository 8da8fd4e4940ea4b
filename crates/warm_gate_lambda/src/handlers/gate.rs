use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use warm_gate_core::contract::{DeploymentHookEvent, LifecycleStatus};
use warm_gate_core::gate::{GateRun, HookKind};
use warm_gate_core::smoke::{load_manifest, TargetMode};

use crate::adapters::status::StatusReporter;
use crate::error::ReportError;
use crate::handlers::smoke_runner::{SmokeRunReport, SmokeTestRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub run: GateRun,
    pub smoke_report: Option<SmokeRunReport>,
}

/// Runs the smoke-test suite around a traffic shift and reports the verdict to
/// the deployment orchestrator.
///
/// Every hook invocation produces exactly one status report. Manifest, probe
/// and even panicking run failures become `Failed`; only a failing report call
/// is returned as an error.
pub struct DeploymentGate {
    runner: SmokeTestRunner,
    reporter: Arc<dyn StatusReporter>,
    manifest_path: PathBuf,
    enabled: bool,
    function_version: Option<String>,
}

impl DeploymentGate {
    pub fn new(
        runner: SmokeTestRunner,
        reporter: Arc<dyn StatusReporter>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            reporter,
            manifest_path: manifest_path.into(),
            enabled: true,
            function_version: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn function_version(mut self, version: Option<String>) -> Self {
        self.function_version = version;
        self
    }

    /// Verify the candidate version before it receives any traffic.
    pub async fn pre_traffic_hook(
        &self,
        event: DeploymentHookEvent,
    ) -> Result<HookOutcome, ReportError> {
        self.execute(HookKind::PreTraffic, event).await
    }

    /// Verify end to end through the live endpoint once traffic has shifted.
    pub async fn post_traffic_hook(
        &self,
        event: DeploymentHookEvent,
    ) -> Result<HookOutcome, ReportError> {
        self.execute(HookKind::PostTraffic, event).await
    }

    async fn execute(
        &self,
        kind: HookKind,
        event: DeploymentHookEvent,
    ) -> Result<HookOutcome, ReportError> {
        let mut run = GateRun::new(kind, event);
        run.start().expect("a new gate run starts idle");
        tracing::info!(
            component = "deployment_gate",
            event = "hook_started",
            hook = kind.as_str(),
            deployment_id = %run.event().deployment_id,
            hook_execution_id = %run.event().hook_execution_id,
            function_version = self.function_version.as_deref().unwrap_or("unknown"),
        );

        let verdict = AssertUnwindSafe(self.verify(kind)).catch_unwind().await;
        let (status, smoke_report) = match verdict {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::error!(
                    component = "deployment_gate",
                    event = "verification_panicked",
                    hook = kind.as_str(),
                );
                (LifecycleStatus::Failed, None)
            }
        };
        run.finish(status).expect("a started gate run can finish");

        let status = run.status_to_report().expect("a finished gate run has a status");
        if let Err(error) = self.reporter.report(run.event(), status).await {
            tracing::error!(
                component = "deployment_gate",
                event = "report_failed",
                hook = kind.as_str(),
                status = %status,
                error = %error,
            );
            return Err(error);
        }
        run.mark_reported().expect("a finished gate run can be reported");

        if status.is_success() {
            tracing::info!(
                component = "deployment_gate",
                event = "hook_reported",
                hook = run.kind().as_str(),
                status = %status,
            );
        } else {
            tracing::warn!(
                component = "deployment_gate",
                event = "hook_reported",
                hook = run.kind().as_str(),
                status = %status,
                failed_tests = smoke_report.as_ref().map_or(0, SmokeRunReport::failed_count),
            );
        }
        Ok(HookOutcome { run, smoke_report })
    }

    async fn verify(&self, kind: HookKind) -> (LifecycleStatus, Option<SmokeRunReport>) {
        if !self.enabled {
            tracing::info!(
                component = "deployment_gate",
                event = "verification_skipped",
                hook = kind.as_str(),
            );
            return (LifecycleStatus::Succeeded, None);
        }

        let mode = target_mode(kind);
        if !self.runner.supports(mode) {
            tracing::error!(
                component = "deployment_gate",
                event = "probe_target_unavailable",
                hook = kind.as_str(),
                mode = mode.as_str(),
            );
            return (LifecycleStatus::Failed, None);
        }

        let tests = match load_manifest(&self.manifest_path) {
            Ok(tests) => tests,
            Err(error) => {
                tracing::error!(
                    component = "deployment_gate",
                    event = "manifest_load_failed",
                    hook = kind.as_str(),
                    error = %error,
                );
                return (LifecycleStatus::Failed, None);
            }
        };

        let report = self.runner.run(&tests, mode).await;
        (report.status, Some(report))
    }
}

pub fn target_mode(kind: HookKind) -> TargetMode {
    match kind {
        HookKind::PreTraffic => TargetMode::Direct,
        HookKind::PostTraffic => TargetMode::PublicEndpoint,
    }
}
