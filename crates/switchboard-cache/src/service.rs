//! Cache wiring and lifecycle.
//!
//! [`CacheService`] owns the shared store, builds the three facades over it
//! with their configured TTLs and supervises the background sweeper.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use switchboard_core::{Clock, LifecycleError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    facade::{
        ContactListCache, InstanceSettingsCache, QuickMessageCache, CONTACTS_TTL,
        INSTANCE_SETTINGS_TTL, QUICK_MESSAGES_TTL,
    },
    store::{CacheStats, CacheStore, DEFAULT_TTL},
    sweeper::{CacheSweeper, DEFAULT_SWEEP_INTERVAL, TASK_NAME},
};

/// How the hosting process lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Long-running server; the sweeper runs.
    #[default]
    LongLived,
    /// Short-lived request handler; no background tasks are started.
    RequestScoped,
}

/// TTLs and sweep settings for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for raw store writes without an explicit TTL.
    pub default_ttl: Duration,
    /// TTL for instance settings.
    pub instance_settings_ttl: Duration,
    /// TTL for the quick-message list.
    pub quick_messages_ttl: Duration,
    /// TTL for contact lists.
    pub contacts_ttl: Duration,
    /// Pause between background sweeps.
    pub sweep_interval: Duration,
    /// Whether background tasks may run.
    pub execution_mode: ExecutionMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            instance_settings_ttl: INSTANCE_SETTINGS_TTL,
            quick_messages_ttl: QUICK_MESSAGES_TTL,
            contacts_ttl: CONTACTS_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            execution_mode: ExecutionMode::LongLived,
        }
    }
}

/// Shared store, facades and sweeper for one process.
pub struct CacheService {
    store: Arc<CacheStore>,
    instance_settings: InstanceSettingsCache,
    quick_messages: QuickMessageCache,
    contacts: ContactListCache,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
    sweeper_started: AtomicBool,
    sweeper: Mutex<Option<CacheSweeper>>,
}

impl CacheService {
    /// Creates the store and facades. The sweeper is not started.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_cancellation(config, clock, CancellationToken::new())
    }

    /// Like [`CacheService::new`], stopping the sweeper when `parent` is
    /// cancelled.
    pub fn with_cancellation(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        parent: CancellationToken,
    ) -> Self {
        let store = Arc::new(CacheStore::with_default_ttl(config.default_ttl, clock.clone()));

        Self {
            instance_settings: InstanceSettingsCache::with_ttl(
                store.clone(),
                config.instance_settings_ttl,
            ),
            quick_messages: QuickMessageCache::with_ttl(store.clone(), config.quick_messages_ttl),
            contacts: ContactListCache::with_ttl(store.clone(), config.contacts_ttl),
            store,
            config,
            clock,
            cancellation_token: parent.child_token(),
            sweeper_started: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Instance settings facade.
    pub fn instance_settings(&self) -> &InstanceSettingsCache {
        &self.instance_settings
    }

    /// Quick-message facade.
    pub fn quick_messages(&self) -> &QuickMessageCache {
        &self.quick_messages
    }

    /// Contact list facade.
    pub fn contacts(&self) -> &ContactListCache {
        &self.contacts
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Entry counts of the shared store.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Starts the background sweeper.
    ///
    /// Returns `Ok(false)` without spawning anything in request-scoped mode.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyStarted`] on any call after the
    /// first successful start.
    pub fn start_sweeper(&self) -> Result<bool, LifecycleError> {
        if self.config.execution_mode == ExecutionMode::RequestScoped {
            info!("request-scoped execution, cache sweeper not started");
            return Ok(false);
        }

        if self.sweeper_started.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyStarted { task: TASK_NAME });
        }

        let sweeper = CacheSweeper::spawn(
            self.store.clone(),
            self.config.sweep_interval,
            self.clock.clone(),
            self.cancellation_token.child_token(),
        );
        *self.lock_sweeper() = Some(sweeper);

        Ok(true)
    }

    /// Returns `true` while the sweeper task is alive.
    pub fn is_sweeper_running(&self) -> bool {
        self.lock_sweeper().as_ref().is_some_and(CacheSweeper::is_running)
    }

    /// Stops the sweeper, waiting at most `timeout`.
    ///
    /// A no-op when the sweeper was never started.
    ///
    /// # Errors
    ///
    /// Propagates the sweeper's shutdown error.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), LifecycleError> {
        let sweeper = self.lock_sweeper().take();
        match sweeper {
            Some(sweeper) => sweeper.shutdown_graceful(timeout).await,
            None => Ok(()),
        }
    }

    fn lock_sweeper(&self) -> std::sync::MutexGuard<'_, Option<CacheSweeper>> {
        self.sweeper.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .field("sweeper_started", &self.sweeper_started.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
