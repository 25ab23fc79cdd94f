//! Message transport port.
//!
//! The retry layer never talks to the gateway directly; it re-invokes a
//! [`MessageTransport`] with the stored payload.

use switchboard_core::OutboundMessage;

use crate::error::Result;

/// Sends one outbound message.
///
/// Implementations impose their own timeouts; callers add none.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync + std::fmt::Debug {
    /// Delivers `message` to the gateway.
    async fn send_message(&self, message: &OutboundMessage) -> Result<()>;
}

pub mod mock {
    //! Scriptable transport for tests.
    //!
    //! Sends succeed unless a failure was scripted for the message. The gate
    //! holds sends in flight until released, which lets tests observe the
    //! in-flight state.

    use std::{
        collections::{HashMap, VecDeque},
        sync::Arc,
    };

    use switchboard_core::{MessageId, OutboundMessage};
    use tokio::sync::{watch, RwLock};

    use super::MessageTransport;
    use crate::error::{Result, SendError};

    /// Transport double recording every send.
    #[derive(Debug)]
    pub struct MockTransport {
        scripted: Arc<RwLock<HashMap<MessageId, VecDeque<SendError>>>>,
        persistent: Arc<RwLock<HashMap<MessageId, SendError>>>,
        sends: Arc<RwLock<Vec<MessageId>>>,
        gate: watch::Sender<bool>,
    }

    impl MockTransport {
        /// Creates a transport where every send succeeds.
        pub fn new() -> Self {
            let (gate, _) = watch::channel(true);
            Self {
                scripted: Arc::new(RwLock::new(HashMap::new())),
                persistent: Arc::new(RwLock::new(HashMap::new())),
                sends: Arc::new(RwLock::new(Vec::new())),
                gate,
            }
        }

        /// Fails the next send of `message_id` with `error`.
        ///
        /// Calls queue up: each scripted error is used once, in order.
        pub async fn fail_next(&self, message_id: MessageId, error: SendError) {
            self.scripted.write().await.entry(message_id).or_default().push_back(error);
        }

        /// Fails every send of `message_id` with `error` until cleared.
        pub async fn fail_always(&self, message_id: MessageId, error: SendError) {
            self.persistent.write().await.insert(message_id, error);
        }

        /// Removes scripted and persistent failures for `message_id`.
        pub async fn recover(&self, message_id: MessageId) {
            self.scripted.write().await.remove(&message_id);
            self.persistent.write().await.remove(&message_id);
        }

        /// Holds every subsequent send until [`MockTransport::release`].
        pub fn hold(&self) {
            self.gate.send_replace(false);
        }

        /// Lets held and future sends proceed.
        pub fn release(&self) {
            self.gate.send_replace(true);
        }

        /// Message IDs of every send started, in order.
        pub async fn sends(&self) -> Vec<MessageId> {
            self.sends.read().await.clone()
        }

        /// Number of sends started for `message_id`.
        pub async fn send_count(&self, message_id: MessageId) -> usize {
            self.sends.read().await.iter().filter(|id| **id == message_id).count()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl MessageTransport for MockTransport {
        async fn send_message(&self, message: &OutboundMessage) -> Result<()> {
            self.sends.write().await.push(message.id);

            let mut gate = self.gate.subscribe();
            gate.wait_for(|open| *open)
                .await
                .map_err(|_| SendError::internal("mock transport gate closed"))?;

            if let Some(error) =
                self.scripted.write().await.get_mut(&message.id).and_then(VecDeque::pop_front)
            {
                return Err(error);
            }
            match self.persistent.read().await.get(&message.id) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }
}
