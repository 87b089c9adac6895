//! The narrow interface other trust components record events through.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// A security-relevant event, before it is sequenced and chained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub event_type: String,
    pub description: String,
    pub success: bool,
    pub details: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(event_type: &str, description: impl Into<String>, success: bool) -> Self {
        Self {
            event_type: event_type.to_string(),
            description: description.into(),
            success,
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Anything that can durably record audit events.
///
/// Recording never fails from the caller's point of view: a validation or
/// signing result must not depend on whether the audit write succeeded.
/// Implementations report their own write failures through `tracing`.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Keeps events in memory. Used by read-only tooling and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the recorded events of one type.
    #[must_use]
    pub fn events_of(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
