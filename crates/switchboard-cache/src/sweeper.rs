//! Background eviction of expired cache entries.
//!
//! Expired entries are already invisible to readers; the sweeper only keeps
//! memory bounded for keys that are written once and never read again.

use std::{sync::Arc, time::Duration};

use switchboard_core::{Clock, LifecycleError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::store::CacheStore;

/// Task name used in logs and lifecycle errors.
pub const TASK_NAME: &str = "cache sweeper";

/// Default pause between sweeps (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Supervised task that periodically sweeps a [`CacheStore`].
pub struct CacheSweeper {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawns the sweep loop on the current runtime.
    ///
    /// The loop runs until `cancellation_token` is cancelled.
    pub fn spawn(
        store: Arc<CacheStore>,
        interval: Duration,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        info!(interval_seconds = interval.as_secs(), "starting cache sweeper");

        let token = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            run(store, interval, clock, token).await;
            info!("cache sweeper stopped");
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
    /// Returns [`LifecycleError::ShutdownTimeout`] if the task does not stop
    /// in time, or [`LifecycleError::TaskPanic`] if it panicked.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<(), LifecycleError> {
        self.cancellation_token.cancel();

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_error)) => {
                error!(error = %join_error, "cache sweeper panicked");
                Err(LifecycleError::TaskPanic { task: TASK_NAME, error: join_error.to_string() })
            },
            Err(_elapsed) => {
                error!(timeout_seconds = timeout.as_secs(), "cache sweeper shutdown timed out");
                Err(LifecycleError::ShutdownTimeout { task: TASK_NAME, timeout })
            },
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if self.is_running() && !self.cancellation_token.is_cancelled() {
            warn!("CacheSweeper dropped while running, cancelling. Call shutdown_graceful() first.");
            self.cancellation_token.cancel();
        }
    }
}

async fn run(
    store: Arc<CacheStore>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = clock.sleep(interval) => {},
            () = cancellation_token.cancelled() => break,
        }

        let evicted = store.sweep();
        if evicted > 0 {
            info!(evicted, remaining = store.len(), "swept expired cache entries");
        } else {
            debug!(remaining = store.len(), "cache sweep found nothing to evict");
        }
    }
}
