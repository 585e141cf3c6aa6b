//! Run lifecycle events.
//!
//! The graph runner reports every node transition as a [`PipelineEvent`] to
//! the run's [`EventSink`]. Sinks must not block or fail.

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide default event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide default event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide default event sink.
///
/// Returns a [`LoggingEventSink`] if none is set, so transitions always
/// reach the log.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(LoggingEventSink::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_sink() {
        let collecting = Arc::new(CollectingEventSink::new());
        set_event_sink(collecting.clone());

        get_event_sink().emit(&PipelineEvent::new("pipeline.started"));
        assert!(collecting.len() >= 1);

        clear_event_sink();
        get_event_sink().emit(&PipelineEvent::new("pipeline.started"));
    }
}
