//! Retry queue events for decoupled UI and service integration.
//!
//! The retry queue emits a [`QueueEvent`] after every state change so the
//! consuming layer can re-read queue size and failed items without polling.
//!
//! ```text
//! ┌─────────────┐   QueueEvent    ┌──────────────────────┐
//! │ RetryQueue  │ ──────────────▶ │ MulticastEventHandler│
//! └─────────────┘                 └──────────────────────┘
//!                                      │            │
//!                                      ▼            ▼
//!                               inbox badge    audit logging
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MessageId;

/// State change of a retry queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A failed send was recorded (new item or repeated failure).
    Enqueued {
        /// Message that failed
        message_id: MessageId,
        /// Failed attempts so far
        attempts: u32,
        /// Transport error message
        error: String,
        /// When the failure was recorded
        at: DateTime<Utc>,
    },
    /// A retry delivered the message; the item left the queue.
    Succeeded {
        /// Delivered message
        message_id: MessageId,
        /// Failed attempts before this success
        attempts: u32,
        /// When the retry succeeded
        at: DateTime<Utc>,
    },
    /// A retry failed and the item went back to pending.
    Failed {
        /// Message that failed again
        message_id: MessageId,
        /// Failed attempts so far
        attempts: u32,
        /// Transport error message
        error: String,
        /// When the retry failed
        at: DateTime<Utc>,
    },
    /// The item will not be retried again.
    Exhausted {
        /// Message given up on
        message_id: MessageId,
        /// Failed attempts recorded
        attempts: u32,
        /// Why the policy gave up
        reason: String,
        /// When the item was exhausted
        at: DateTime<Utc>,
    },
    /// The item was removed by the user.
    Dismissed {
        /// Removed message
        message_id: MessageId,
        /// When the item was removed
        at: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Message the event refers to.
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Enqueued { message_id, .. }
            | Self::Succeeded { message_id, .. }
            | Self::Failed { message_id, .. }
            | Self::Exhausted { message_id, .. }
            | Self::Dismissed { message_id, .. } => *message_id,
        }
    }
}

/// Receives retry queue events.
///
/// Handlers must not block; the queue awaits them inline after releasing its
/// lock.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a queue event.
    async fn handle_event(&self, event: QueueEvent);
}

/// Handler that discards every event.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a no-op handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: QueueEvent) {}
}

/// Forwards each event to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: QueueEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}

/// Handler that logs every event at debug level.
#[derive(Debug, Default)]
pub struct TracingEventHandler;

#[async_trait::async_trait]
impl EventHandler for TracingEventHandler {
    async fn handle_event(&self, event: QueueEvent) {
        match &event {
            QueueEvent::Exhausted { message_id, attempts, reason, .. } => {
                tracing::warn!(%message_id, attempts, reason = %reason, "message retries exhausted");
            },
            _ => tracing::debug!(message_id = %event.message_id(), ?event, "retry queue event"),
        }
    }
}
