//! Namespaced, typed views over the shared cache store.
//!
//! Each facade owns a key prefix and a default TTL and hides key derivation
//! from callers:
//!
//! | Facade | Key | TTL |
//! |---|---|---|
//! | [`InstanceSettingsCache`] | `instance_settings:{instance}` | 10 min |
//! | [`QuickMessageCache`] | `quick_messages` | 15 min |
//! | [`ContactListCache`] | `contacts:{instance}[:{filter digest}]` | 2 min |
//!
//! The instance segment of contact keys is percent-encoded, so an instance
//! id containing `:` cannot be mistaken for another instance's filtered key.
//!
//! Prefixes must not overlap between facades. That is an authoring contract
//! and is not checked at runtime.

use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use switchboard_core::{Contact, ContactFilters, InstanceId, InstanceSettings, QuickMessage};
use tracing::warn;

use crate::store::CacheStore;

/// Key prefix for instance settings.
pub const INSTANCE_SETTINGS_PREFIX: &str = "instance_settings:";

/// Singleton key for the quick-message list.
pub const QUICK_MESSAGES_KEY: &str = "quick_messages";

/// Key prefix for contact lists.
pub const CONTACTS_PREFIX: &str = "contacts:";

/// Default TTL for instance settings.
pub const INSTANCE_SETTINGS_TTL: Duration = Duration::from_secs(10 * 60);

/// Default TTL for the quick-message list.
pub const QUICK_MESSAGES_TTL: Duration = Duration::from_secs(15 * 60);

/// Default TTL for contact lists. Kept short because contact lists carry
/// unread counts and last-message times.
pub const CONTACTS_TTL: Duration = Duration::from_secs(2 * 60);

/// Reads a typed value, treating anything undecodable as a miss.
fn read<T: DeserializeOwned>(store: &CacheStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(error) => {
            warn!(key, error = %error, "discarding undecodable cache entry");
            store.delete(key);
            None
        },
    }
}

/// Writes a typed value. Values that fail to encode are not cached.
fn write<T: Serialize + ?Sized>(store: &CacheStore, key: String, value: &T, ttl: Duration) {
    match serde_json::to_value(value) {
        Ok(encoded) => store.set_with_ttl(key, encoded, ttl),
        Err(error) => warn!(key = %key, error = %error, "skipping cache write for unencodable value"),
    }
}

/// Cache of per-instance settings.
#[derive(Debug, Clone)]
pub struct InstanceSettingsCache {
    store: Arc<CacheStore>,
    ttl: Duration,
}

impl InstanceSettingsCache {
    /// Creates the facade with the default TTL.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_ttl(store, INSTANCE_SETTINGS_TTL)
    }

    /// Creates the facade with a custom TTL.
    pub fn with_ttl(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Key under which `instance_id` is stored.
    pub fn key(instance_id: &InstanceId) -> String {
        format!("{INSTANCE_SETTINGS_PREFIX}{instance_id}")
    }

    /// Cached settings for an instance.
    pub fn get(&self, instance_id: &InstanceId) -> Option<InstanceSettings> {
        read(&self.store, &Self::key(instance_id))
    }

    /// Caches settings for an instance.
    pub fn set(&self, instance_id: &InstanceId, settings: &InstanceSettings) {
        write(&self.store, Self::key(instance_id), settings, self.ttl);
    }

    /// Drops cached settings for an instance.
    pub fn delete(&self, instance_id: &InstanceId) -> bool {
        self.store.delete(&Self::key(instance_id))
    }
}

/// Cache of the account-wide quick-message list.
#[derive(Debug, Clone)]
pub struct QuickMessageCache {
    store: Arc<CacheStore>,
    ttl: Duration,
}

impl QuickMessageCache {
    /// Creates the facade with the default TTL.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_ttl(store, QUICK_MESSAGES_TTL)
    }

    /// Creates the facade with a custom TTL.
    pub fn with_ttl(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Cached quick messages.
    pub fn get(&self) -> Option<Vec<QuickMessage>> {
        read(&self.store, QUICK_MESSAGES_KEY)
    }

    /// Caches the quick-message list.
    pub fn set(&self, messages: &[QuickMessage]) {
        write(&self.store, QUICK_MESSAGES_KEY.to_string(), messages, self.ttl);
    }

    /// Drops the cached list.
    pub fn delete(&self) -> bool {
        self.store.delete(QUICK_MESSAGES_KEY)
    }
}

/// Cache of contact lists per instance and filter combination.
#[derive(Debug, Clone)]
pub struct ContactListCache {
    store: Arc<CacheStore>,
    ttl: Duration,
}

impl ContactListCache {
    /// Creates the facade with the default TTL.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_ttl(store, CONTACTS_TTL)
    }

    /// Creates the facade with a custom TTL.
    pub fn with_ttl(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Key for an instance's contact list under `filters`.
    ///
    /// Unfiltered lists and empty filter sets share the bare instance key.
    pub fn key(instance_id: &InstanceId, filters: Option<&ContactFilters>) -> String {
        let instance = urlencoding::encode(instance_id.as_str());
        match filters.filter(|filters| !filters.is_empty()) {
            Some(filters) => format!("{CONTACTS_PREFIX}{instance}:{}", filters.digest()),
            None => format!("{CONTACTS_PREFIX}{instance}"),
        }
    }

    /// Cached contact list.
    pub fn get(
        &self,
        instance_id: &InstanceId,
        filters: Option<&ContactFilters>,
    ) -> Option<Vec<Contact>> {
        read(&self.store, &Self::key(instance_id, filters))
    }

    /// Caches a contact list.
    pub fn set(
        &self,
        instance_id: &InstanceId,
        contacts: &[Contact],
        filters: Option<&ContactFilters>,
    ) {
        write(&self.store, Self::key(instance_id, filters), contacts, self.ttl);
    }

    /// Drops one cached contact list.
    pub fn delete(&self, instance_id: &InstanceId, filters: Option<&ContactFilters>) -> bool {
        self.store.delete(&Self::key(instance_id, filters))
    }

    /// Drops every cached list for an instance, whatever its filters.
    ///
    /// Matches the bare key and keys continuing with `:`, so clearing `I1`
    /// leaves `I10` untouched and clearing `loja` leaves `loja:centro`
    /// untouched.
    pub fn clear_instance(&self, instance_id: &InstanceId) -> usize {
        let base = Self::key(instance_id, None);
        let filtered = format!("{base}:");
        let removed =
            self.store.remove_matching(|key| key == base || key.starts_with(filtered.as_str()));

        tracing::debug!(%instance_id, removed, "cleared cached contact lists");
        removed
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use switchboard_core::TestClock;

    use super::*;

    fn shared_store() -> (Arc<CacheStore>, TestClock) {
        let clock = TestClock::new();
        (Arc::new(CacheStore::new(Arc::new(clock.clone()))), clock)
    }

    fn settings(id: &str) -> InstanceSettings {
        InstanceSettings {
            instance_id: InstanceId::from(id),
            display_name: format!("Loja {id}"),
            webhook_url: None,
            auto_reply_enabled: true,
            away_message: Some("Voltamos já".to_string()),
            updated_at: Utc::now(),
        }
    }

    fn contact(name: &str, contact_type: &str) -> Contact {
        Contact {
            id: "5511988887777@s.whatsapp.net".to_string(),
            instance_id: InstanceId::from("I1"),
            name: name.to_string(),
            phone: "+5511988887777".to_string(),
            contact_type: contact_type.to_string(),
            unread_count: 2,
            last_message_at: None,
        }
    }

    #[test]
    fn keys_are_namespaced() {
        let instance = InstanceId::from("I1");
        let filters = ContactFilters::new().with("type", "cliente");

        assert_eq!(InstanceSettingsCache::key(&instance), "instance_settings:I1");
        assert_eq!(ContactListCache::key(&instance, None), "contacts:I1");
        assert_eq!(ContactListCache::key(&instance, Some(&filters)), "contacts:I1:type=cliente");
        assert_eq!(ContactListCache::key(&instance, Some(&ContactFilters::new())), "contacts:I1");
        assert_eq!(
            ContactListCache::key(&InstanceId::from("loja:centro"), None),
            "contacts:loja%3Acentro"
        );
    }

    #[test]
    fn settings_round_trip_and_expire() {
        let (store, clock) = shared_store();
        let cache = InstanceSettingsCache::new(store);
        let instance = InstanceId::from("I1");
        cache.set(&instance, &settings("I1"));

        clock.advance(INSTANCE_SETTINGS_TTL);
        assert_eq!(cache.get(&instance).map(|s| s.display_name), Some("Loja I1".to_string()));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&instance).is_none());
    }

    #[test]
    fn quick_messages_use_singleton_key() {
        let (store, _clock) = shared_store();
        let cache = QuickMessageCache::new(store.clone());
        cache.set(&[]);

        assert_eq!(store.keys(), vec![QUICK_MESSAGES_KEY.to_string()]);
        assert_eq!(cache.get(), Some(Vec::new()));
        assert!(cache.delete());
        assert!(cache.get().is_none());
    }

    #[test]
    fn undecodable_entry_is_a_miss() {
        let (store, _clock) = shared_store();
        store.set("instance_settings:I1", serde_json::json!({"unexpected": true}));
        let cache = InstanceSettingsCache::new(store.clone());

        assert!(cache.get(&InstanceId::from("I1")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_instance_respects_key_boundary() {
        let (store, _clock) = shared_store();
        let cache = ContactListCache::new(store.clone());
        let leads = ContactFilters::new().with("type", "lead");
        cache.set(&InstanceId::from("I1"), &[], None);
        cache.set(&InstanceId::from("I1"), &[], Some(&leads));
        cache.set(&InstanceId::from("I10"), &[], None);

        assert_eq!(cache.clear_instance(&InstanceId::from("I1")), 2);
        assert!(cache.get(&InstanceId::from("I10"), None).is_some());
    }

    #[test]
    fn clear_instance_ignores_instances_sharing_a_colon_prefix() {
        let (store, _clock) = shared_store();
        let cache = ContactListCache::new(store);
        let leads = ContactFilters::new().with("type", "lead");
        cache.set(&InstanceId::from("loja"), &[], None);
        cache.set(&InstanceId::from("loja"), &[], Some(&leads));
        cache.set(&InstanceId::from("loja:centro"), &[], None);
        cache.set(&InstanceId::from("loja:centro"), &[], Some(&leads));

        assert_eq!(cache.clear_instance(&InstanceId::from("loja")), 2);
        assert!(cache.get(&InstanceId::from("loja:centro"), None).is_some());
        assert!(cache.get(&InstanceId::from("loja:centro"), Some(&leads)).is_some());
    }

    #[test]
    fn filter_values_with_separators_get_their_own_entry() {
        let (store, _clock) = shared_store();
        let cache = ContactListCache::new(store);
        let i1 = InstanceId::from("I1");
        let leads = ContactFilters::new().with("search", "ana").with("type", "lead");
        let typed = ContactFilters::new().with("search", "ana&type=lead");
        cache.set(&i1, &[contact("Ana Lima", "lead")], Some(&leads));

        assert!(cache.get(&i1, Some(&typed)).is_none());
        assert_eq!(cache.get(&i1, Some(&leads)).map(|list| list.len()), Some(1));
    }
}
