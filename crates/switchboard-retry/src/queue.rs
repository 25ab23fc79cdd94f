//! Delivery retry queue.
//!
//! Tracks outbound messages whose send failed and re-attempts them on
//! request. Each message has at most one item, keyed by [`MessageId`]:
//!
//! ```text
//! enqueue ──▶ Pending ──retry──▶ InFlight ──ok──▶ (removed)
//!               ▲                   │
//!               └──── failure ──────┤
//!                                   └── policy gives up ──▶ Exhausted
//! ```
//!
//! `remove_from_queue` drops an item in any state. The queue lock is never
//! held while the transport runs; the in-flight status is what keeps a
//! message from being sent twice at once. Every item carries a generation,
//! so a send that completes after its item was removed (or removed and
//! re-enqueued) cannot touch the current item.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use switchboard_core::{Clock, EventHandler, MessageId, NoOpEventHandler, OutboundMessage, QueueEvent};
use tracing::{debug, info, warn};

use crate::{
    error::SendError,
    policy::{RetryContext, RetryDecision, RetryPolicy},
    transport::MessageTransport,
};

/// Lifecycle state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    /// Waiting for a retry.
    Pending,
    /// A retry is being sent.
    InFlight,
    /// The policy gave up; only removal applies.
    Exhausted,
}

/// Snapshot of a failed message awaiting retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryQueueItem {
    /// The message to re-send.
    pub message: OutboundMessage,
    /// Current state.
    pub status: RetryStatus,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// When the message first failed.
    pub first_failed_at: DateTime<Utc>,
    /// When the most recent attempt finished.
    pub last_attempt_at: DateTime<Utc>,
    /// Earliest time for an automatic retry. `None` once exhausted.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Why the policy gave up, for exhausted items.
    pub exhausted_reason: Option<String>,
}

impl RetryQueueItem {
    /// ID of the queued message.
    pub fn message_id(&self) -> MessageId {
        self.message.id
    }

    /// Records a failed attempt and applies the policy.
    ///
    /// Returns the give-up reason when the item became exhausted. Items in
    /// flight keep their status; the completing send applies it.
    fn record_failure(
        &mut self,
        error: &SendError,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Option<String> {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.last_attempt_at = now;

        if self.status == RetryStatus::InFlight {
            return None;
        }

        match RetryContext::new(self.attempts, error, self.first_failed_at, now, policy)
            .decide_retry()
        {
            RetryDecision::Retry { next_attempt_at } => {
                self.status = RetryStatus::Pending;
                self.next_attempt_at = Some(next_attempt_at);
                self.exhausted_reason = None;
                None
            },
            RetryDecision::GiveUp { reason } => {
                self.status = RetryStatus::Exhausted;
                self.next_attempt_at = None;
                self.exhausted_reason = Some(reason.clone());
                Some(reason)
            },
        }
    }
}

/// Result of a single retry request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The message was delivered and left the queue.
    Succeeded {
        /// Failed attempts before this success
        attempts: u32,
    },
    /// The send failed again.
    Failed {
        /// Error of this attempt
        error: SendError,
        /// Failed attempts so far
        attempts: u32,
        /// Whether the policy gave up after this failure
        exhausted: bool,
    },
    /// The item is exhausted; nothing was sent.
    Exhausted {
        /// Why the policy gave up
        reason: String,
    },
    /// A retry for this message is already running; nothing was sent.
    AlreadyInFlight,
    /// No item exists for this message; nothing was sent.
    NotQueued,
    /// The item was removed while the send was in flight and the result
    /// was discarded.
    Dismissed,
}

/// Per-item results of a bulk retry, each list in enqueue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryAllReport {
    /// Delivered messages.
    pub succeeded: Vec<MessageId>,
    /// Messages whose retry failed again.
    pub failed: Vec<MessageId>,
    /// Messages whose state changed before their attempt started.
    pub skipped: Vec<MessageId>,
}

impl RetryAllReport {
    /// Number of messages the bulk retry looked at.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }
}

#[derive(Debug)]
struct Entry {
    item: RetryQueueItem,
    generation: u64,
    sequence: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<MessageId, Entry>,
    next_sequence: u64,
    next_generation: u64,
}

impl QueueState {
    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }
}

/// Queue of failed messages with single and bulk retry.
pub struct RetryQueue {
    state: Mutex<QueueState>,
    transport: Arc<dyn MessageTransport>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
}

impl RetryQueue {
    /// Creates an empty queue sending through `transport`.
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            transport,
            policy,
            clock,
            event_handler: Arc::new(NoOpEventHandler::new()),
        }
    }

    /// Sets the handler receiving queue events.
    #[must_use]
    pub fn with_event_handler(mut self, event_handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = event_handler;
        self
    }

    /// Active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Records a failed send of `message`.
    ///
    /// A message already queued has its attempt count incremented and its
    /// payload and error replaced; otherwise a new item starts at one
    /// attempt. The policy runs after recording, so this can exhaust the
    /// item straight away.
    pub async fn enqueue(&self, message: OutboundMessage, error: &SendError) -> RetryQueueItem {
        let now = self.clock.now_utc();
        let message_id = message.id;

        let (snapshot, exhausted) = {
            let mut state = self.lock();
            let sequence = state.next_sequence;
            let generation = state.next_generation;

            let entry = state.entries.entry(message_id).or_insert_with(|| Entry {
                item: RetryQueueItem {
                    message: message.clone(),
                    status: RetryStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    first_failed_at: now,
                    last_attempt_at: now,
                    next_attempt_at: None,
                    exhausted_reason: None,
                },
                generation,
                sequence,
            });
            let is_new = entry.generation == generation && entry.item.attempts == 0;

            entry.item.message = message;
            let exhausted = entry.item.record_failure(error, now, &self.policy);
            let snapshot = entry.item.clone();

            if is_new {
                state.next_sequence += 1;
                state.next_generation += 1;
            }
            (snapshot, exhausted)
        };

        warn!(
            %message_id,
            attempts = snapshot.attempts,
            category = %error.category(),
            error = %error,
            "message send failed, queued for retry"
        );

        self.emit(QueueEvent::Enqueued {
            message_id,
            attempts: snapshot.attempts,
            error: error.to_string(),
            at: now,
        })
        .await;
        if let Some(reason) = exhausted {
            self.emit_exhausted(message_id, snapshot.attempts, reason, now).await;
        }

        snapshot
    }

    /// Re-sends one queued message.
    ///
    /// Nothing is sent when the item is absent, exhausted or already in
    /// flight. On success the item is removed; on failure the error is
    /// recorded and the policy decides between pending and exhausted.
    pub async fn retry(&self, message_id: MessageId) -> RetryOutcome {
        let (message, generation) = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get_mut(&message_id) else {
                debug!(%message_id, "retry requested for message not in queue");
                return RetryOutcome::NotQueued;
            };

            match entry.item.status {
                RetryStatus::InFlight => {
                    debug!(%message_id, "retry already in flight");
                    return RetryOutcome::AlreadyInFlight;
                },
                RetryStatus::Exhausted => {
                    return RetryOutcome::Exhausted {
                        reason: entry.item.exhausted_reason.clone().unwrap_or_default(),
                    };
                },
                RetryStatus::Pending => {
                    entry.item.status = RetryStatus::InFlight;
                    (entry.item.message.clone(), entry.generation)
                },
            }
        };

        let mut flight = InFlight { queue: self, message_id, generation, settled: false };
        debug!(%message_id, "retrying message");
        let result = self.transport.send_message(&message).await;
        flight.settled = true;

        let now = self.clock.now_utc();
        match result {
            Ok(()) => self.complete_success(message_id, generation, now).await,
            Err(error) => self.complete_failure(message_id, generation, error, now).await,
        }
    }

    /// Retries every item pending at call time, concurrently.
    ///
    /// One item's failure does not affect the others.
    pub async fn retry_all(&self) -> RetryAllReport {
        let ids = self.pending_ids(|_| true);
        self.retry_batch(ids).await
    }

    /// Retries pending items whose backoff delay has elapsed.
    pub async fn retry_due(&self) -> RetryAllReport {
        let now = self.clock.now_utc();
        let ids = self.pending_ids(|item| item.next_attempt_at.is_some_and(|due| due <= now));
        self.retry_batch(ids).await
    }

    /// Removes a message from the queue in any state.
    ///
    /// A send already in flight completes, but its result is discarded.
    /// Returns whether an item was present.
    pub async fn remove_from_queue(&self, message_id: MessageId) -> bool {
        let removed = self.lock().entries.remove(&message_id);
        let Some(entry) = removed else {
            return false;
        };

        info!(%message_id, status = ?entry.item.status, "message removed from retry queue");
        self.emit(QueueEvent::Dismissed { message_id, at: self.clock.now_utc() }).await;
        true
    }

    /// Items still expected to be delivered: pending plus in flight.
    pub fn size(&self) -> usize {
        self.lock().entries.values().filter(|e| e.item.status != RetryStatus::Exhausted).count()
    }

    /// Every item in enqueue order.
    pub fn items(&self) -> Vec<RetryQueueItem> {
        self.lock().ordered().into_iter().map(|entry| entry.item.clone()).collect()
    }

    /// Pending and exhausted items with a recorded error, in enqueue order.
    pub fn failed_items(&self) -> Vec<RetryQueueItem> {
        self.lock()
            .ordered()
            .into_iter()
            .filter(|entry| {
                entry.item.status != RetryStatus::InFlight && entry.item.last_error.is_some()
            })
            .map(|entry| entry.item.clone())
            .collect()
    }

    /// Number of exhausted items.
    pub fn exhausted_count(&self) -> usize {
        self.lock().entries.values().filter(|e| e.item.status == RetryStatus::Exhausted).count()
    }

    /// Snapshot of one item.
    pub fn get(&self, message_id: MessageId) -> Option<RetryQueueItem> {
        self.lock().entries.get(&message_id).map(|entry| entry.item.clone())
    }

    async fn retry_batch(&self, ids: Vec<MessageId>) -> RetryAllReport {
        if ids.is_empty() {
            return RetryAllReport::default();
        }

        let outcomes =
            join_all(ids.into_iter().map(|id| async move { (id, self.retry(id).await) })).await;

        let mut report = RetryAllReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                RetryOutcome::Succeeded { .. } => report.succeeded.push(id),
                RetryOutcome::Failed { .. } => report.failed.push(id),
                RetryOutcome::Exhausted { .. }
                | RetryOutcome::AlreadyInFlight
                | RetryOutcome::NotQueued
                | RetryOutcome::Dismissed => report.skipped.push(id),
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "bulk retry completed"
        );
        report
    }

    fn pending_ids(&self, due: impl Fn(&RetryQueueItem) -> bool) -> Vec<MessageId> {
        self.lock()
            .ordered()
            .into_iter()
            .filter(|entry| entry.item.status == RetryStatus::Pending && due(&entry.item))
            .map(|entry| entry.item.message_id())
            .collect()
    }

    async fn complete_success(
        &self,
        message_id: MessageId,
        generation: u64,
        now: DateTime<Utc>,
    ) -> RetryOutcome {
        let attempts = {
            let mut state = self.lock();
            match state.entries.get(&message_id) {
                Some(entry) if entry.generation == generation => {
                    state.entries.remove(&message_id).map(|entry| entry.item.attempts)
                },
                _ => None,
            }
        };

        let Some(attempts) = attempts else {
            debug!(%message_id, "message removed during retry, discarding success");
            return RetryOutcome::Dismissed;
        };

        info!(%message_id, attempts, "queued message delivered");
        self.emit(QueueEvent::Succeeded { message_id, attempts, at: now }).await;
        RetryOutcome::Succeeded { attempts }
    }

    async fn complete_failure(
        &self,
        message_id: MessageId,
        generation: u64,
        error: SendError,
        now: DateTime<Utc>,
    ) -> RetryOutcome {
        let recorded = {
            let mut state = self.lock();
            match state.entries.get_mut(&message_id) {
                Some(entry) if entry.generation == generation => {
                    entry.item.status = RetryStatus::Pending;
                    let exhausted = entry.item.record_failure(&error, now, &self.policy);
                    Some((entry.item.attempts, exhausted))
                },
                _ => None,
            }
        };

        let Some((attempts, exhausted)) = recorded else {
            debug!(%message_id, error = %error, "message removed during retry, discarding failure");
            return RetryOutcome::Dismissed;
        };

        warn!(
            %message_id,
            attempts,
            category = %error.category(),
            error = %error,
            "retry failed"
        );
        self.emit(QueueEvent::Failed { message_id, attempts, error: error.to_string(), at: now })
            .await;

        let is_exhausted = exhausted.is_some();
        if let Some(reason) = exhausted {
            self.emit_exhausted(message_id, attempts, reason, now).await;
        }

        RetryOutcome::Failed { error, attempts, exhausted: is_exhausted }
    }

    async fn emit_exhausted(
        &self,
        message_id: MessageId,
        attempts: u32,
        reason: String,
        at: DateTime<Utc>,
    ) {
        warn!(%message_id, attempts, reason = %reason, "giving up on message");
        self.emit(QueueEvent::Exhausted { message_id, attempts, reason, at }).await;
    }

    async fn emit(&self, event: QueueEvent) {
        self.event_handler.handle_event(event).await;
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RetryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryQueue")
            .field("size", &self.size())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Returns an in-flight item to pending if its send is abandoned before
/// completing, so a cancelled retry does not strand it.
struct InFlight<'a> {
    queue: &'a RetryQueue,
    message_id: MessageId,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut state = self.queue.lock();
        if let Some(entry) = state.entries.get_mut(&self.message_id) {
            if entry.generation == self.generation && entry.item.status == RetryStatus::InFlight {
                entry.item.status = RetryStatus::Pending;
                warn!(message_id = %self.message_id, "retry abandoned, item returned to pending");
            }
        }
    }
}
