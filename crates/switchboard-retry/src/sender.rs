//! Outbound send path with automatic queueing.

use std::sync::Arc;

use serde::Serialize;
use switchboard_core::{MessageId, OutboundMessage};
use tracing::{debug, instrument};

use crate::{
    error::SendError,
    queue::{RetryQueue, RetryQueueItem},
    transport::MessageTransport,
};

/// What happened to a message handed to [`MessageSender::send`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendReport {
    /// The gateway accepted the message.
    Delivered {
        /// Delivered message
        message_id: MessageId,
    },
    /// The send failed and the message is now in the retry queue.
    Queued {
        /// The queue item after recording the failure
        item: RetryQueueItem,
        /// Error of the failed send
        error: SendError,
    },
}

/// Sends messages and queues failures for retry.
#[derive(Debug, Clone)]
pub struct MessageSender {
    transport: Arc<dyn MessageTransport>,
    queue: Arc<RetryQueue>,
}

impl MessageSender {
    /// Creates a sender over `transport` feeding `queue`.
    pub fn new(transport: Arc<dyn MessageTransport>, queue: Arc<RetryQueue>) -> Self {
        Self { transport, queue }
    }

    /// Sends `message` once; on failure enqueues it.
    #[instrument(skip_all, fields(message_id = %message.id, instance_id = %message.instance_id))]
    pub async fn send(&self, message: OutboundMessage) -> SendReport {
        match self.transport.send_message(&message).await {
            Ok(()) => {
                debug!("message delivered");
                SendReport::Delivered { message_id: message.id }
            },
            Err(error) => {
                let item = self.queue.enqueue(message, &error).await;
                SendReport::Queued { item, error }
            },
        }
    }

    /// The queue failures are recorded in.
    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }
}
