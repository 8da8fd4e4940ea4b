//! Lifecycle of a single deployment-gate hook execution.
//!
//! `Idle -> Running -> {Succeeded, Failed} -> Reported`. `Reported` is terminal
//! and every run must reach it exactly once.

use thiserror::Error;

use crate::contract::{DeploymentHookEvent, LifecycleStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Running,
    Succeeded,
    Failed,
    Reported,
}

impl GatePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Reported => "reported",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreTraffic,
    PostTraffic,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreTraffic => "pre_traffic",
            Self::PostTraffic => "post_traffic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal gate transition from {from} to {to}")]
pub struct GateTransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRun {
    kind: HookKind,
    event: DeploymentHookEvent,
    phase: GatePhase,
    status: Option<LifecycleStatus>,
    history: Vec<GatePhase>,
}

impl GateRun {
    pub fn new(kind: HookKind, event: DeploymentHookEvent) -> Self {
        Self {
            kind,
            event,
            phase: GatePhase::Idle,
            status: None,
            history: vec![GatePhase::Idle],
        }
    }

    pub fn kind(&self) -> HookKind {
        self.kind
    }

    pub fn event(&self) -> &DeploymentHookEvent {
        &self.event
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn status(&self) -> Option<LifecycleStatus> {
        self.status
    }

    pub fn history(&self) -> &[GatePhase] {
        &self.history
    }

    pub fn start(&mut self) -> Result<(), GateTransitionError> {
        self.transition(GatePhase::Idle, GatePhase::Running)
    }

    pub fn finish(&mut self, status: LifecycleStatus) -> Result<(), GateTransitionError> {
        let next = match status {
            LifecycleStatus::Succeeded => GatePhase::Succeeded,
            LifecycleStatus::Failed => GatePhase::Failed,
        };
        self.transition(GatePhase::Running, next)?;
        self.status = Some(status);
        Ok(())
    }

    /// Status to hand to the orchestrator; only available once the run finished.
    pub fn status_to_report(&self) -> Result<LifecycleStatus, GateTransitionError> {
        match (self.phase, self.status) {
            (GatePhase::Succeeded | GatePhase::Failed, Some(status)) => Ok(status),
            _ => Err(GateTransitionError {
                from: self.phase.as_str(),
                to: GatePhase::Reported.as_str(),
            }),
        }
    }

    pub fn mark_reported(&mut self) -> Result<(), GateTransitionError> {
        self.status_to_report()?;
        self.phase = GatePhase::Reported;
        self.history.push(GatePhase::Reported);
        Ok(())
    }

    fn transition(&mut self, from: GatePhase, to: GatePhase) -> Result<(), GateTransitionError> {
        if self.phase != from {
            return Err(GateTransitionError {
                from: self.phase.as_str(),
                to: to.as_str(),
            });
        }
        self.phase = to;
        self.history.push(to);
        Ok(())
    }
}
