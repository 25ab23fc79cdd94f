//! Read-through access to the inbox directory.
//!
//! Reads consult the matching facade first. On a miss or an expired entry
//! the value is fetched from [`DirectoryStorage`] and written back with the
//! facade's TTL. Writers call the `invalidate_*` hooks after changing the
//! backing store so the next read refetches.

use std::sync::Arc;

use switchboard_core::{Contact, ContactFilters, InstanceId, InstanceSettings, QuickMessage, Result};
use tracing::{debug, instrument};

use crate::{
    facade::{ContactListCache, InstanceSettingsCache, QuickMessageCache},
    service::CacheService,
    storage::DirectoryStorage,
};

/// Directory reads served from cache when possible.
#[derive(Clone)]
pub struct CachedDirectory {
    storage: Arc<dyn DirectoryStorage>,
    instance_settings: InstanceSettingsCache,
    quick_messages: QuickMessageCache,
    contacts: ContactListCache,
}

impl CachedDirectory {
    /// Creates a loader over `storage` using the facades of `cache`.
    pub fn new(storage: Arc<dyn DirectoryStorage>, cache: &CacheService) -> Self {
        Self {
            storage,
            instance_settings: cache.instance_settings().clone(),
            quick_messages: cache.quick_messages().clone(),
            contacts: cache.contacts().clone(),
        }
    }

    /// Settings for an instance.
    ///
    /// Unknown instances yield `Ok(None)` and are not cached, so a later
    /// creation is visible immediately.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; the cache is left untouched.
    #[instrument(skip_all, fields(%instance_id))]
    pub async fn instance_settings(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceSettings>> {
        if let Some(settings) = self.instance_settings.get(instance_id) {
            debug!("instance settings served from cache");
            return Ok(Some(settings));
        }

        let settings = self.storage.fetch_instance_settings(instance_id.clone()).await?;
        if let Some(settings) = &settings {
            self.instance_settings.set(instance_id, settings);
        }
        Ok(settings)
    }

    /// The quick-message list.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[instrument(skip_all)]
    pub async fn quick_messages(&self) -> Result<Vec<QuickMessage>> {
        if let Some(messages) = self.quick_messages.get() {
            debug!(count = messages.len(), "quick messages served from cache");
            return Ok(messages);
        }

        let messages = self.storage.fetch_quick_messages().await?;
        self.quick_messages.set(&messages);
        Ok(messages)
    }

    /// Contacts of an instance matching `filters`.
    ///
    /// Each filter combination is cached independently.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[instrument(skip_all, fields(%instance_id))]
    pub async fn contacts(
        &self,
        instance_id: &InstanceId,
        filters: Option<&ContactFilters>,
    ) -> Result<Vec<Contact>> {
        if let Some(contacts) = self.contacts.get(instance_id, filters) {
            debug!(count = contacts.len(), "contacts served from cache");
            return Ok(contacts);
        }

        let contacts = self
            .storage
            .fetch_contacts(instance_id.clone(), filters.cloned().unwrap_or_default())
            .await?;
        self.contacts.set(instance_id, &contacts, filters);
        Ok(contacts)
    }

    /// Drops cached settings after a write.
    pub fn invalidate_instance_settings(&self, instance_id: &InstanceId) {
        self.instance_settings.delete(instance_id);
    }

    /// Drops the cached quick-message list after a write.
    pub fn invalidate_quick_messages(&self) {
        self.quick_messages.delete();
    }

    /// Drops every cached contact list of an instance after a write.
    pub fn invalidate_contacts(&self, instance_id: &InstanceId) -> usize {
        self.contacts.clear_instance(instance_id)
    }
}

impl std::fmt::Debug for CachedDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDirectory").finish_non_exhaustive()
    }
}
