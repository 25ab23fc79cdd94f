//! Event handler that records queue events for assertions.

use async_trait::async_trait;
use switchboard_core::{EventHandler, MessageId, QueueEvent};
use tokio::sync::RwLock;

/// Records every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: RwLock<Vec<QueueEvent>>,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    pub async fn events(&self) -> Vec<QueueEvent> {
        self.events.read().await.clone()
    }

    /// Events for one message.
    pub async fn events_for(&self, message_id: MessageId) -> Vec<QueueEvent> {
        self.events.read().await.iter().filter(|e| e.message_id() == message_id).cloned().collect()
    }

    /// Number of `Exhausted` events.
    pub async fn exhausted_count(&self) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| matches!(event, QueueEvent::Exhausted { .. }))
            .count()
    }

    /// Forgets recorded events.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: QueueEvent) {
        self.events.write().await.push(event);
    }
}
