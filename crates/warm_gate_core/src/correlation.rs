//! Per-invocation correlation identifiers.
//!
//! The context lives as long as the worker process, but its value belongs to
//! the invocation currently being served. Log enrichment reads it lazily via
//! [`CorrelationContext::current`], so the value must be overwritten at the top
//! of every application invocation.

use parking_lot::RwLock;
use uuid::Uuid;

use crate::contract::{InvocationEvent, CORRELATION_HEADER};

#[derive(Debug, Default)]
pub struct CorrelationContext {
    current: RwLock<Option<String>>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the id for `event` and make it the current value.
    pub fn resolve(&self, event: &InvocationEvent) -> String {
        let correlation_id = inbound_correlation_id(event)
            .map(str::to_string)
            .unwrap_or_else(generate_correlation_id);
        *self.current.write() = Some(correlation_id.clone());
        correlation_id
    }

    pub fn current(&self) -> Option<String> {
        self.current.read().clone()
    }
}

fn inbound_correlation_id(event: &InvocationEvent) -> Option<&str> {
    event
        .header(CORRELATION_HEADER)
        .filter(|value| !value.is_empty())
}

pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
