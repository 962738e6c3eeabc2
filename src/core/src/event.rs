use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event key type
pub type EventKey = String;

/// Event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Empty,
    String(String),
    Map(HashMap<String, serde_json::Value>),
}

/// Pipeline progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event key (e.g., "fetch.started", "upload.completed")
    pub key: EventKey,

    /// Event payload
    pub payload: EventPayload,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PipelineEvent {
    /// Create a new event
    pub fn new(key: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            key: key.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create an event with no payload
    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, EventPayload::Empty)
    }

    /// Create an event with a string payload
    pub fn with_string(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, EventPayload::String(message.into()))
    }

    /// Create an event with a map payload
    pub fn with_map(key: impl Into<String>, map: HashMap<String, serde_json::Value>) -> Self {
        Self::new(key, EventPayload::Map(map))
    }

    /// Map payload with a local/remote path pair.
    pub fn upload(key: impl Into<String>, local: &str, remote: &str) -> Self {
        let mut map = HashMap::new();
        map.insert("local".to_string(), serde_json::Value::from(local));
        map.insert("remote".to_string(), serde_json::Value::from(remote));
        Self::with_map(key, map)
    }
}

/// Event emitter. Sending never blocks and never fails when nobody listens.
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<PipelineEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Event catalog - predefined event keys
pub mod events {
    // Fetch
    pub const FETCH_STARTED: &str = "fetch.started";
    pub const FETCH_COMPLETED: &str = "fetch.completed";

    // Extract
    pub const EXTRACT_COMPLETED: &str = "extract.completed";
    pub const EXTRACT_ENTRY_SKIPPED: &str = "extract.entry.skipped";

    // Analyze
    pub const ANALYZE_COMPLETED: &str = "analyze.completed";

    // Upload
    pub const UPLOAD_STARTED: &str = "upload.started";
    pub const UPLOAD_COMPLETED: &str = "upload.completed";
    pub const UPLOAD_FAILED: &str = "upload.failed";

    // Pipeline
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let emitter = EventEmitter::new(8);
        let mut rx = emitter.subscribe();

        emitter.emit(PipelineEvent::upload(
            events::UPLOAD_COMPLETED,
            "/tmp/x/index.html",
            "cdn/mfe/index.html",
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, events::UPLOAD_COMPLETED);
        match event.payload {
            EventPayload::Map(map) => {
                assert_eq!(map["remote"], "cdn/mfe/index.html");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let emitter = EventEmitter::default();
        emitter.emit(PipelineEvent::empty(events::FETCH_STARTED));
    }

    #[test]
    fn test_string_payload_serializes_untagged() {
        let event = PipelineEvent::with_string(events::FETCH_STARTED, "ghcr.io/org/app:v1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["key"], "fetch.started");
        assert_eq!(json["payload"], "ghcr.io/org/app:v1");
    }
}
