//! Event sink trait and implementations.

use super::PipelineEvent;
use parking_lot::RwLock;

/// Receives pipeline events.
pub trait EventSink: Send + Sync {
    /// Records an event. Must not block and must never fail.
    fn emit(&self, event: &PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// A sink that writes events to the `tracing` log.
///
/// Failure events are logged at `warn`, everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        let run_id = event.run_id.map(|id| id.to_string()).unwrap_or_default();
        let task = event.task.as_deref().unwrap_or("-");

        if event.is_failure() {
            tracing::warn!(
                event_type = %event.event_type,
                run_id = %run_id,
                task = %task,
                attempt = ?event.attempt,
                payload = %event.payload,
                "Event: {}", event.event_type
            );
        } else {
            tracing::info!(
                event_type = %event.event_type,
                run_id = %run_id,
                task = %task,
                attempt = ?event.attempt,
                payload = %event.payload,
                "Event: {}", event.event_type
            );
        }
    }
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events of exactly the given type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns the event types recorded for one task, in order.
    #[must_use]
    pub fn types_for_task(&self, task: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.task.as_deref() == Some(task))
            .map(|e| e.event_type.clone())
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
