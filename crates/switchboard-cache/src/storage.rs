//! Persistent-store port consulted on cache misses.
//!
//! The inbox reads instance settings, quick replies and contacts from its
//! database. This trait abstracts those reads so the read-through loader can
//! be tested without one.

use std::{future::Future, pin::Pin};

use switchboard_core::{Contact, ContactFilters, InstanceId, InstanceSettings, QuickMessage, Result};

/// Reads the inbox directory from the backing store.
pub trait DirectoryStorage: Send + Sync + 'static {
    /// Settings for an instance, or `None` when the instance is unknown.
    fn fetch_instance_settings(
        &self,
        instance_id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InstanceSettings>>> + Send + '_>>;

    /// The account-wide quick-message list.
    fn fetch_quick_messages(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QuickMessage>>> + Send + '_>>;

    /// Contacts of an instance matching `filters`.
    fn fetch_contacts(
        &self,
        instance_id: InstanceId,
        filters: ContactFilters,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Contact>>> + Send + '_>>;
}

pub mod mock {
    //! In-memory directory for tests.
    //!
    //! Counts every fetch so tests can assert whether a read was served from
    //! cache, and supports one-shot error injection.

    use std::{
        collections::HashMap,
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use switchboard_core::{
        Contact, ContactFilters, CoreError, InstanceId, InstanceSettings, QuickMessage, Result,
    };
    use tokio::sync::RwLock;

    use super::DirectoryStorage;

    /// Mock directory backed by maps.
    #[derive(Debug, Default)]
    pub struct MockDirectoryStorage {
        settings: Arc<RwLock<HashMap<InstanceId, InstanceSettings>>>,
        quick_messages: Arc<RwLock<Vec<QuickMessage>>>,
        contacts: Arc<RwLock<Vec<Contact>>>,
        fetch_error: Arc<RwLock<Option<String>>>,
        settings_fetches: Arc<AtomicUsize>,
        quick_message_fetches: Arc<AtomicUsize>,
        contact_fetches: Arc<AtomicUsize>,
    }

    impl MockDirectoryStorage {
        /// Creates an empty directory.
        pub fn new() -> Self {
            Self::default()
        }

        /// Stores settings for their instance.
        pub async fn put_instance_settings(&self, settings: InstanceSettings) {
            self.settings.write().await.insert(settings.instance_id.clone(), settings);
        }

        /// Replaces the quick-message list.
        pub async fn put_quick_messages(&self, messages: Vec<QuickMessage>) {
            *self.quick_messages.write().await = messages;
        }

        /// Adds a contact.
        pub async fn add_contact(&self, contact: Contact) {
            self.contacts.write().await.push(contact);
        }

        /// Makes the next fetch of any kind fail with a storage error.
        pub async fn inject_fetch_error(&self, error: impl Into<String>) {
            *self.fetch_error.write().await = Some(error.into());
        }

        /// Number of settings fetches served.
        pub fn settings_fetches(&self) -> usize {
            self.settings_fetches.load(Ordering::SeqCst)
        }

        /// Number of quick-message fetches served.
        pub fn quick_message_fetches(&self) -> usize {
            self.quick_message_fetches.load(Ordering::SeqCst)
        }

        /// Number of contact fetches served.
        pub fn contact_fetches(&self) -> usize {
            self.contact_fetches.load(Ordering::SeqCst)
        }

        async fn take_error(&self) -> Result<()> {
            match self.fetch_error.write().await.take() {
                Some(error) => Err(CoreError::storage(error)),
                None => Ok(()),
            }
        }
    }

    impl DirectoryStorage for MockDirectoryStorage {
        fn fetch_instance_settings(
            &self,
            instance_id: InstanceId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<InstanceSettings>>> + Send + '_>> {
            Box::pin(async move {
                self.settings_fetches.fetch_add(1, Ordering::SeqCst);
                self.take_error().await?;
                Ok(self.settings.read().await.get(&instance_id).cloned())
            })
        }

        fn fetch_quick_messages(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<QuickMessage>>> + Send + '_>> {
            Box::pin(async move {
                self.quick_message_fetches.fetch_add(1, Ordering::SeqCst);
                self.take_error().await?;
                Ok(self.quick_messages.read().await.clone())
            })
        }

        fn fetch_contacts(
            &self,
            instance_id: InstanceId,
            filters: ContactFilters,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Contact>>> + Send + '_>> {
            Box::pin(async move {
                self.contact_fetches.fetch_add(1, Ordering::SeqCst);
                self.take_error().await?;
                Ok(self
                    .contacts
                    .read()
                    .await
                    .iter()
                    .filter(|contact| contact.instance_id == instance_id && filters.matches(contact))
                    .cloned()
                    .collect())
            })
        }
    }
}
