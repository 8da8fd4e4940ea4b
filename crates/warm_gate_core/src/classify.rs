//! Classification of inbound invocations into control and application traffic.

use crate::contract::{InvocationEvent, CONCURRENCY_HEADER, KEEP_ALIVE_HEADER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationKind {
    Control(ControlSignals),
    Application,
}

/// Control headers found on a method-less invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlSignals {
    pub concurrency: Option<ConcurrencyRequest>,
    pub keep_alive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyRequest {
    Count(u32),
    Unparseable(String),
}

impl ControlSignals {
    /// Environments to populate besides the one serving this invocation.
    pub fn additional_environments(&self) -> usize {
        match self.concurrency {
            Some(ConcurrencyRequest::Count(count)) => count.saturating_sub(1) as usize,
            _ => 0,
        }
    }

    /// Neither control header was present: a legacy caller pinging the function.
    pub fn is_bare_ping(&self) -> bool {
        self.concurrency.is_none() && !self.keep_alive
    }
}

pub fn classify(event: &InvocationEvent) -> InvocationKind {
    if event.method().is_some() {
        return InvocationKind::Application;
    }

    let concurrency = event.header(CONCURRENCY_HEADER).map(|raw| {
        raw.trim()
            .parse::<u32>()
            .map(ConcurrencyRequest::Count)
            .unwrap_or_else(|_| ConcurrencyRequest::Unparseable(raw.to_string()))
    });

    InvocationKind::Control(ControlSignals {
        concurrency,
        keep_alive: event.has_header(KEEP_ALIVE_HEADER),
    })
}
