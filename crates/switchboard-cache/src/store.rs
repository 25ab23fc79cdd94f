//! Expiring key-value store.
//!
//! A process-local map from string keys to values with a per-entry TTL.
//! Expired entries are evicted lazily when read and eagerly by [`sweep`],
//! so correctness never depends on the background sweeper running.
//!
//! All operations are synchronous and serialized behind one mutex; the lock
//! is never held across an await point.
//!
//! [`sweep`]: ExpiringStore::sweep

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::Serialize;
use switchboard_core::Clock;

/// Default TTL applied by [`ExpiringStore::set`] (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Store shared by all facades. Values are JSON so facades of different
/// types can share one store.
pub type CacheStore = ExpiringStore<serde_json::Value>;

/// A stored value with its liveness window.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Live iff `now - inserted_at <= ttl`.
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) <= self.ttl
    }
}

/// Point-in-time entry counts.
///
/// Collected without evicting anything; expired entries are counted, not
/// removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// All stored entries.
    pub total: usize,
    /// Entries still inside their TTL.
    pub valid: usize,
    /// Entries past their TTL awaiting eviction.
    pub expired: usize,
}

/// Thread-safe map of keys to expiring values.
#[derive(Debug)]
pub struct ExpiringStore<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ExpiringStore<V> {
    /// Creates an empty store using [`DEFAULT_TTL`].
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_ttl(DEFAULT_TTL, clock)
    }

    /// Creates an empty store with a custom default TTL.
    pub fn with_default_ttl(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), default_ttl, clock }
    }

    /// TTL applied when none is given.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the value if present and live.
    ///
    /// A stale entry found here is removed before returning `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            },
            None => None,
        }
    }

    /// Inserts or overwrites `key` with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Inserts or overwrites `key`, restarting its window at now.
    ///
    /// Any previous entry is discarded regardless of its remaining time.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry { value, inserted_at: self.clock.now(), ttl };
        self.lock().insert(key.into(), entry);
    }

    /// Removes `key`, returning whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Removes every entry whose window has elapsed and returns how many.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Counts entries by liveness without mutating the store.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.lock();
        let valid = entries.values().filter(|entry| entry.is_live(now)).count();

        CacheStats { total: entries.len(), valid, expired: entries.len() - valid }
    }

    /// Snapshot of all stored keys, live or not.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Removes every entry whose key satisfies `predicate`.
    ///
    /// Scans the whole store; cost is linear in the number of entries.
    pub fn remove_matching(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
