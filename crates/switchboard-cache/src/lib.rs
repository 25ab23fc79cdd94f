//! In-process TTL cache for the inbox.
//!
//! Layers, bottom up:
//!
//! - [`ExpiringStore`]: string keys to values with a per-entry TTL, lazily
//!   evicted on read and eagerly by [`ExpiringStore::sweep`].
//! - Facades ([`InstanceSettingsCache`], [`QuickMessageCache`],
//!   [`ContactListCache`]): typed, namespaced views with their own TTLs over
//!   one shared [`CacheStore`].
//! - [`CacheSweeper`]: background task purging expired entries.
//! - [`CacheService`]: wiring and lifecycle.
//! - [`CachedDirectory`]: read-through loader over a [`DirectoryStorage`].
//!
//! The cache has no error channel: a miss, an expired entry and an
//! undecodable entry all read as `None`, and callers fall back to the
//! backing store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod facade;
pub mod read_through;
pub mod service;
pub mod storage;
pub mod store;
pub mod sweeper;

pub use facade::{ContactListCache, InstanceSettingsCache, QuickMessageCache};
pub use read_through::CachedDirectory;
pub use service::{CacheConfig, CacheService, ExecutionMode};
pub use storage::DirectoryStorage;
pub use store::{CacheEntry, CacheStats, CacheStore, ExpiringStore, DEFAULT_TTL};
pub use sweeper::CacheSweeper;
