//! Observability events attached to targets.

use std::sync::{Arc, Mutex};

use warden_core::TargetId;

/// Severity of an observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Routine progress.
    Normal,
    /// Something needing attention.
    Warning,
}

impl EventType {
    /// Stable string form for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// One structured event attached to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event severity.
    pub event_type: EventType,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl Event {
    /// Create a normal event.
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Create a warning event.
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Sink for observability events.
pub trait EventRecorder: Send + Sync {
    /// Record one event against a target.
    fn record(&self, target: &TargetId, event: Event);
}

/// Production sink: events become structured tracing events.
#[derive(Default)]
pub struct TracingEventRecorder;

impl TracingEventRecorder {
    /// Create a new tracing event recorder.
    pub fn new() -> Self {
        Self
    }

    /// Create a new tracing event recorder wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl EventRecorder for TracingEventRecorder {
    fn record(&self, target: &TargetId, event: Event) {
        match event.event_type {
            EventType::Normal => {
                tracing::info!(
                    target_id = %target,
                    reason = %event.reason,
                    message = %event.message,
                    "Target event"
                );
            }
            EventType::Warning => {
                tracing::warn!(
                    target_id = %target,
                    reason = %event.reason,
                    message = %event.message,
                    "Target event"
                );
            }
        }
    }
}

/// In-memory recorder for tests.
#[derive(Default)]
pub struct InMemoryEventRecorder {
    events: Mutex<Vec<(TargetId, Event)>>,
}

impl InMemoryEventRecorder {
    /// Create a new in-memory event recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory event recorder wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every recorded event.
    pub fn events(&self) -> Vec<(TargetId, Event)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Events recorded for one target.
    pub fn for_target(&self, target: &TargetId) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|(id, _)| id == target)
            .map(|(_, event)| event)
            .collect()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn record(&self, target: &TargetId, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push((target.clone(), event));
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_recorder_collects() {
        let recorder = InMemoryEventRecorder::new();
        let a = TargetId::new("ns", "a");
        let b = TargetId::new("ns", "b");

        recorder.record(&a, Event::normal("Created", "created endpoint"));
        recorder.record(&b, Event::warning("QuorumBlocked", "waiting on deps"));

        assert_eq!(recorder.events().len(), 2);
        let for_a = recorder.for_target(&a);
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a.first().map(|e| e.event_type), Some(EventType::Normal));
    }

    #[test]
    fn test_event_constructors() {
        let event = Event::warning("Reason", "message");
        assert_eq!(event.event_type.as_str(), "Warning");
        assert_eq!(event.reason, "Reason");
    }
}
