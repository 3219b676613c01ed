//! Event sink trait and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receives build lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event, awaiting delivery.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event from synchronous code, such as a stream adapter.
    ///
    /// Must not block or panic.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Forwards events to `tracing`, tagged with the build they belong to.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs at `level`; anything more verbose than `INFO` logs at `DEBUG`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log(&self, event_type: &str, data: Option<&Value>) {
        let build = data
            .and_then(|d| d.get("build"))
            .and_then(Value::as_str)
            .unwrap_or("-");
        if self.level > Level::INFO {
            debug!(build, event = event_type, data = ?data, "Build event");
        } else {
            info!(build, event = event_type, data = ?data, "Build event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }
}

/// An event kept by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Event type, e.g. `build.completed`.
    pub event_type: String,
    /// Payload.
    pub data: Option<Value>,
    /// When the sink received it.
    pub at: DateTime<Utc>,
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// The types of every event received so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Payloads of the events of exactly this type.
    #[must_use]
    pub fn payloads(&self, event_type: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.data.clone())
            .collect()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
            at: Utc::now(),
        });
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_logging_sink_accepts_any_payload() {
        let sink = LoggingEventSink::new(Level::DEBUG);
        sink.emit("build.started", Some(json!({"build": "es5"}))).await;
        sink.try_emit("build.failed", None);
        LoggingEventSink::default().try_emit("manifest.generated", Some(json!([1, 2])));
        NoOpEventSink.emit("build.completed", None).await;
    }

    #[tokio::test]
    async fn test_collecting_sink_keeps_arrival_order() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("build.started", Some(json!({"build": "a"}))).await;
        sink.try_emit("build.completed", Some(json!({"build": "a", "files": 3})));
        sink.try_emit("manifest.generated", None);

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.event_types(),
            vec!["build.started", "build.completed", "manifest.generated"]
        );
        assert_eq!(sink.payloads("build.completed"), vec![json!({"build": "a", "files": 3})]);
        let events = sink.events();
        assert!(events[0].at <= events[2].at);
    }
}
