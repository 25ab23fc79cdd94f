//! Background retries of due queue items.
//!
//! Off by default: the inbox normally retries from the UI only. When
//! enabled, one supervised task polls [`RetryQueue::retry_due`] so pending
//! items are re-sent once their backoff delay has elapsed.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use switchboard_core::{Clock, LifecycleError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::RetryQueue;

/// Task name used in logs and lifecycle errors.
pub const TASK_NAME: &str = "auto-retry scheduler";

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduler should run at all.
    pub enabled: bool,
    /// Pause between polls of the queue.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: false, poll_interval: Duration::from_secs(30) }
    }
}

/// Supervised task retrying due items.
pub struct AutoRetryScheduler {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AutoRetryScheduler {
    /// Spawns the polling loop on the current runtime.
    ///
    /// The loop finishes a poll already in progress before observing
    /// cancellation.
    pub fn spawn(
        queue: Arc<RetryQueue>,
        config: &SchedulerConfig,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        info!(poll_interval_seconds = config.poll_interval.as_secs(), "starting auto-retry scheduler");

        let interval = config.poll_interval;
        let token = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            run(queue, interval, clock, token).await;
            info!("auto-retry scheduler stopped");
        });

        Self { cancellation_token, handle: Some(handle) }
    }

    /// Returns `true` while the loop has not exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the loop and waits up to `timeout` for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShutdownTimeout`] if a poll does not finish
    /// in time, or [`LifecycleError::TaskPanic`] if the task panicked.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<(), LifecycleError> {
        info!(timeout_seconds = timeout.as_secs(), "stopping auto-retry scheduler");
        self.cancellation_token.cancel();

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_error)) => {
                error!(error = %join_error, "auto-retry scheduler panicked");
                Err(LifecycleError::TaskPanic { task: TASK_NAME, error: join_error.to_string() })
            },
            Err(_elapsed) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "auto-retry scheduler shutdown timed out, retries may still be in flight"
                );
                Err(LifecycleError::ShutdownTimeout { task: TASK_NAME, timeout })
            },
        }
    }
}

impl Drop for AutoRetryScheduler {
    fn drop(&mut self) {
        if self.is_running() && !self.cancellation_token.is_cancelled() {
            error!("AutoRetryScheduler dropped while running! Forcing cancellation");
            self.cancellation_token.cancel();
            warn!("call shutdown_graceful() before dropping the scheduler");
        }
    }
}

async fn run(
    queue: Arc<RetryQueue>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = clock.sleep(interval) => {},
            () = cancellation_token.cancelled() => break,
        }

        let report = queue.retry_due().await;
        if report.total() > 0 {
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "automatic retry pass completed"
            );
        } else {
            debug!(queue_size = queue.size(), "no queued messages due for retry");
        }
    }
}
