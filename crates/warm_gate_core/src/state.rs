//! State owned by a long-lived worker process and shared across invocations.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::correlation::CorrelationContext;

/// Warm flag and correlation context for one worker process.
///
/// The platform may reuse a process for many invocations but delivers at most
/// one application invocation at a time. Nothing here enforces that; the
/// in-flight counter only makes a violation observable.
#[derive(Debug, Default)]
pub struct WorkerState {
    warm: AtomicBool,
    correlation: CorrelationContext,
    in_flight: AtomicUsize,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Acquire)
    }

    /// Warmth is never reset; environment recycling happens outside the process.
    pub fn mark_warm(&self) {
        self.warm.store(true, Ordering::Release);
    }

    pub fn correlation(&self) -> &CorrelationContext {
        &self.correlation
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Register an application invocation for the lifetime of the guard.
    pub fn enter_application(&self) -> ApplicationGuard<'_> {
        let previous = self.in_flight.fetch_add(1, Ordering::AcqRel);
        ApplicationGuard {
            state: self,
            overlapped: previous > 0,
        }
    }
}

#[derive(Debug)]
pub struct ApplicationGuard<'a> {
    state: &'a WorkerState,
    overlapped: bool,
}

impl ApplicationGuard<'_> {
    /// True when another application invocation was already in flight.
    pub fn overlapped(&self) -> bool {
        self.overlapped
    }
}

impl Drop for ApplicationGuard<'_> {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
