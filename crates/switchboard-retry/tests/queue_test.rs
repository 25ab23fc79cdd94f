//! Integration tests for the retry queue.
//!
//! Drives the queue through the scriptable transport to cover bulk retry
//! reporting, removal during flight, the single-flight guarantee and
//! exhaustion.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use switchboard_core::{EventHandler, InstanceId, OutboundMessage, QueueEvent, TestClock};
use switchboard_retry::{
    transport::mock::MockTransport, RetryOutcome, RetryPolicy, RetryQueue, RetryStatus, SendError,
};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Recorder {
    events: Mutex<Vec<QueueEvent>>,
}

#[async_trait::async_trait]
impl EventHandler for Recorder {
    async fn handle_event(&self, event: QueueEvent) {
        self.events.lock().await.push(event);
    }
}

impl Recorder {
    async fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| match event {
                QueueEvent::Enqueued { .. } => "enqueued",
                QueueEvent::Succeeded { .. } => "succeeded",
                QueueEvent::Failed { .. } => "failed",
                QueueEvent::Exhausted { .. } => "exhausted",
                QueueEvent::Dismissed { .. } => "dismissed",
            })
            .collect()
    }
}

struct Harness {
    queue: Arc<RetryQueue>,
    transport: Arc<MockTransport>,
    recorder: Arc<Recorder>,
    clock: TestClock,
}

fn harness(policy: RetryPolicy) -> Harness {
    let clock = TestClock::new();
    let transport = Arc::new(MockTransport::new());
    let recorder = Arc::new(Recorder::default());
    let queue = Arc::new(
        RetryQueue::new(transport.clone(), policy, Arc::new(clock.clone()))
            .with_event_handler(recorder.clone()),
    );
    Harness { queue, transport, recorder, clock }
}

fn message(text: &str) -> OutboundMessage {
    OutboundMessage::text(InstanceId::from("I1"), "5511912345678", text, Utc::now())
}

async fn wait_for_sends(transport: &MockTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while transport.sends().await.len() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("sends should start");
}

#[tokio::test]
async fn retry_all_reports_each_item_in_enqueue_order() {
    let env = harness(RetryPolicy::default());
    let (a, b, c) = (message("a"), message("b"), message("c"));
    for msg in [&a, &b, &c] {
        env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;
    }
    env.transport.fail_next(b.id, SendError::gateway_error(503, "unavailable")).await;

    let report = env.queue.retry_all().await;

    assert_eq!(report.succeeded, vec![a.id, c.id]);
    assert_eq!(report.failed, vec![b.id]);
    assert!(report.skipped.is_empty());
    assert_eq!(env.queue.size(), 1);

    let remaining = env.queue.get(b.id).expect("b stays queued");
    assert_eq!(remaining.attempts, 2);
    assert_eq!(remaining.status, RetryStatus::Pending);
    assert_eq!(remaining.last_error.as_deref(), Some("gateway error: HTTP 503"));
}

#[tokio::test]
async fn removed_item_is_not_retried() {
    let env = harness(RetryPolicy::default());
    let msg = message("olá");
    env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;

    assert!(!env.queue.remove_from_queue(message("other").id).await);
    assert!(env.queue.remove_from_queue(msg.id).await);

    assert_eq!(env.queue.size(), 0);
    assert_eq!(env.queue.retry(msg.id).await, RetryOutcome::NotQueued);
    assert!(env.transport.sends().await.is_empty());
    assert_eq!(env.recorder.kinds().await, ["enqueued", "dismissed"]);
}

#[tokio::test]
async fn concurrent_retry_is_rejected_while_in_flight() {
    let env = harness(RetryPolicy::default());
    let msg = message("single flight");
    env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;
    env.transport.hold();

    let queue = env.queue.clone();
    let first = tokio::spawn(async move { queue.retry(msg.id).await });
    wait_for_sends(&env.transport, 1).await;

    assert_eq!(env.queue.get(msg.id).map(|item| item.status), Some(RetryStatus::InFlight));
    assert_eq!(env.queue.size(), 1);
    assert_eq!(env.queue.retry(msg.id).await, RetryOutcome::AlreadyInFlight);

    env.transport.release();
    assert_eq!(first.await.unwrap(), RetryOutcome::Succeeded { attempts: 1 });
    assert_eq!(env.transport.send_count(msg.id).await, 1);
}

#[tokio::test]
async fn retry_all_leaves_in_flight_items_alone() {
    let env = harness(RetryPolicy::default());
    let (a, b) = (message("a"), message("b"));
    env.queue.enqueue(a.clone(), &SendError::timeout(30)).await;
    env.queue.enqueue(b.clone(), &SendError::timeout(30)).await;
    env.transport.hold();

    let queue = env.queue.clone();
    let single = tokio::spawn(async move { queue.retry(a.id).await });
    wait_for_sends(&env.transport, 1).await;

    let queue = env.queue.clone();
    let bulk = tokio::spawn(async move { queue.retry_all().await });
    wait_for_sends(&env.transport, 2).await;

    env.transport.release();
    let report = bulk.await.unwrap();

    assert_eq!(report.succeeded, vec![b.id]);
    assert!(report.failed.is_empty());
    assert!(report.skipped.is_empty());
    assert_eq!(single.await.unwrap(), RetryOutcome::Succeeded { attempts: 1 });
    assert_eq!(env.transport.send_count(a.id).await, 1);
    assert_eq!(env.transport.send_count(b.id).await, 1);
    assert_eq!(env.queue.size(), 0);
}

#[tokio::test]
async fn removal_during_flight_discards_result() {
    let env = harness(RetryPolicy::default());
    let msg = message("dismissed mid-send");
    env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;
    env.transport.fail_next(msg.id, SendError::network("reset")).await;
    env.transport.hold();

    let queue = env.queue.clone();
    let flight = tokio::spawn(async move { queue.retry(msg.id).await });
    wait_for_sends(&env.transport, 1).await;

    assert!(env.queue.remove_from_queue(msg.id).await);
    env.transport.release();

    assert_eq!(flight.await.unwrap(), RetryOutcome::Dismissed);
    assert!(env.queue.get(msg.id).is_none());
    assert_eq!(env.queue.size(), 0);
}

#[tokio::test]
async fn reenqueue_after_removal_is_not_touched_by_stale_flight() {
    let env = harness(RetryPolicy::default());
    let msg = message("re-sent by user");
    env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;
    env.transport.hold();

    let queue = env.queue.clone();
    let flight = tokio::spawn(async move { queue.retry(msg.id).await });
    wait_for_sends(&env.transport, 1).await;

    env.queue.remove_from_queue(msg.id).await;
    env.queue.enqueue(msg.clone(), &SendError::network("offline")).await;
    env.transport.release();

    assert_eq!(flight.await.unwrap(), RetryOutcome::Dismissed);
    let item = env.queue.get(msg.id).expect("new item survives");
    assert_eq!(item.attempts, 1);
    assert_eq!(item.status, RetryStatus::Pending);
}

#[tokio::test]
async fn item_exhausts_after_max_attempts() {
    let env = harness(RetryPolicy { max_attempts: 3, ..RetryPolicy::default() });
    let msg = message("never arrives");
    env.transport.fail_always(msg.id, SendError::instance_disconnected("I1")).await;
    env.queue.enqueue(msg.clone(), &SendError::instance_disconnected("I1")).await;

    let second = env.queue.retry(msg.id).await;
    let third = env.queue.retry(msg.id).await;

    assert!(matches!(second, RetryOutcome::Failed { attempts: 2, exhausted: false, .. }));
    assert!(matches!(third, RetryOutcome::Failed { attempts: 3, exhausted: true, .. }));
    assert!(matches!(env.queue.retry(msg.id).await, RetryOutcome::Exhausted { .. }));
    assert_eq!(env.transport.send_count(msg.id).await, 2);

    assert_eq!(env.queue.size(), 0);
    assert_eq!(env.queue.exhausted_count(), 1);
    assert_eq!(env.queue.failed_items().len(), 1);
    assert_eq!(
        env.recorder.kinds().await,
        ["enqueued", "failed", "failed", "exhausted"]
    );

    assert!(env.queue.remove_from_queue(msg.id).await);
    assert_eq!(env.queue.exhausted_count(), 0);
}

#[tokio::test]
async fn retry_all_skips_exhausted_items() {
    let env = harness(RetryPolicy::default());
    let rejected = message("rejected");
    let pending = message("pending");
    env.queue.enqueue(rejected.clone(), &SendError::rejected(400, "invalid")).await;
    env.queue.enqueue(pending.clone(), &SendError::timeout(30)).await;

    let report = env.queue.retry_all().await;

    assert_eq!(report.succeeded, vec![pending.id]);
    assert_eq!(report.total(), 1);
    assert_eq!(env.transport.sends().await, vec![pending.id]);
}

#[tokio::test]
async fn retry_due_waits_for_backoff() {
    let env = harness(RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() });
    let msg = message("backoff");
    env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;

    assert_eq!(env.queue.retry_due().await.total(), 0);

    env.clock.advance(Duration::from_secs(2));
    let report = env.queue.retry_due().await;

    assert_eq!(report.succeeded, vec![msg.id]);
}

#[tokio::test]
async fn retry_window_exhausts_old_failures() {
    let env = harness(RetryPolicy::default());
    let msg = message("stale");
    env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;

    env.clock.advance(Duration::from_secs(25 * 60 * 60));
    let item = env.queue.enqueue(msg.clone(), &SendError::timeout(30)).await;

    assert_eq!(item.status, RetryStatus::Exhausted);
    assert!(item.exhausted_reason.unwrap().contains("retry window"));
}
