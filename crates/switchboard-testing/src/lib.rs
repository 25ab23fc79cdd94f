//! Test infrastructure for deterministic end-to-end testing.
//!
//! [`TestEnv`] wires every component the way the binary does, but over the
//! in-memory directory, the scriptable transport and a [`TestClock`], so
//! tests control expiry and backoff without sleeping.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use switchboard_cache::{
    storage::mock::MockDirectoryStorage, CacheConfig, CacheService, CachedDirectory,
};
use switchboard_core::Clock;
use switchboard_retry::{
    transport::mock::MockTransport, MessageSender, RetryPolicy, RetryQueue,
};

pub mod events;
pub mod fixtures;

pub use events::RecordingEventHandler;
pub use fixtures::{ContactBuilder, MessageBuilder};
pub use switchboard_core::TestClock;

/// Fully wired resilience layer over test doubles.
pub struct TestEnv {
    /// Deterministic clock shared by every component.
    pub clock: TestClock,
    /// Backing store consulted on cache misses.
    pub directory_storage: Arc<MockDirectoryStorage>,
    /// Transport used for sends and retries.
    pub transport: Arc<MockTransport>,
    /// Cache store, facades and sweeper.
    pub cache: CacheService,
    /// Read-through loader over the cache.
    pub directory: CachedDirectory,
    /// Retry queue.
    pub queue: Arc<RetryQueue>,
    /// Send path feeding the queue.
    pub sender: MessageSender,
    /// Every queue event emitted so far.
    pub events: Arc<RecordingEventHandler>,
}

impl TestEnv {
    /// Creates an environment with default cache and retry settings.
    pub fn new() -> Self {
        TestEnvBuilder::new().build()
    }

    /// Starts configuring an environment.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::new()
    }

    /// Advances the shared clock.
    pub fn advance_time(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Returns elapsed time since the environment was created.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Lets spawned background tasks run for a few scheduler turns.
    pub async fn settle(&self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestEnv`].
#[derive(Debug, Default)]
pub struct TestEnvBuilder {
    cache_config: CacheConfig,
    retry_policy: RetryPolicy,
}

impl TestEnvBuilder {
    /// Starts from default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the cache configuration.
    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Wires the environment.
    pub fn build(self) -> TestEnv {
        let clock = TestClock::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let directory_storage = Arc::new(MockDirectoryStorage::new());
        let cache = CacheService::new(self.cache_config, shared_clock.clone());
        let directory = CachedDirectory::new(directory_storage.clone(), &cache);

        let transport = Arc::new(MockTransport::new());
        let events = Arc::new(RecordingEventHandler::new());
        let queue = Arc::new(
            RetryQueue::new(transport.clone(), self.retry_policy, shared_clock)
                .with_event_handler(events.clone()),
        );
        let sender = MessageSender::new(transport.clone(), queue.clone());

        TestEnv { clock, directory_storage, transport, cache, directory, queue, sender, events }
    }
}
