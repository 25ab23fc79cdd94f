//! Integration tests for the read-through directory loader.
//!
//! Exercises cache hits, expiry-driven refetches and write-side
//! invalidation against the in-memory directory.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use switchboard_cache::{
    facade::{CONTACTS_TTL, INSTANCE_SETTINGS_TTL},
    storage::mock::MockDirectoryStorage,
    CacheConfig, CacheService, CachedDirectory,
};
use switchboard_core::{
    Contact, ContactFilters, InstanceId, InstanceSettings, QuickMessage, TestClock,
};
use uuid::Uuid;

struct Fixture {
    clock: TestClock,
    storage: Arc<MockDirectoryStorage>,
    cache: CacheService,
    directory: CachedDirectory,
}

fn fixture() -> Fixture {
    let clock = TestClock::new();
    let storage = Arc::new(MockDirectoryStorage::new());
    let cache = CacheService::new(CacheConfig::default(), Arc::new(clock.clone()));
    let directory = CachedDirectory::new(storage.clone(), &cache);
    Fixture { clock, storage, cache, directory }
}

fn contact(instance: &str, name: &str, contact_type: &str) -> Contact {
    Contact {
        id: format!("{}@s.whatsapp.net", name.to_lowercase()),
        instance_id: InstanceId::from(instance),
        name: name.to_string(),
        phone: "+5511988887777".to_string(),
        contact_type: contact_type.to_string(),
        unread_count: 1,
        last_message_at: Some(Utc::now()),
    }
}

#[tokio::test]
async fn settings_are_fetched_once_until_expiry() -> anyhow::Result<()> {
    let env = fixture();
    let instance = InstanceId::from("I1");
    env.storage
        .put_instance_settings(InstanceSettings {
            instance_id: instance.clone(),
            display_name: "Atendimento".to_string(),
            webhook_url: Some("https://hooks.example.com/I1".to_string()),
            auto_reply_enabled: false,
            away_message: None,
            updated_at: Utc::now(),
        })
        .await;

    env.directory.instance_settings(&instance).await?;
    env.directory.instance_settings(&instance).await?;
    assert_eq!(env.storage.settings_fetches(), 1);

    env.clock.advance(INSTANCE_SETTINGS_TTL + Duration::from_secs(1));
    let settings = env.directory.instance_settings(&instance).await?;

    assert_eq!(settings.map(|s| s.display_name), Some("Atendimento".to_string()));
    assert_eq!(env.storage.settings_fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn unknown_instance_is_not_cached() -> anyhow::Result<()> {
    let env = fixture();
    let instance = InstanceId::from("missing");

    assert!(env.directory.instance_settings(&instance).await?.is_none());
    assert!(env.directory.instance_settings(&instance).await?.is_none());

    assert_eq!(env.storage.settings_fetches(), 2);
    assert!(env.cache.store().is_empty());
    Ok(())
}

#[tokio::test]
async fn contact_write_invalidates_filtered_lists() -> anyhow::Result<()> {
    let env = fixture();
    let i1 = InstanceId::from("I1");
    let clientes = ContactFilters::new().with("type", "cliente");
    env.storage.add_contact(contact("I1", "Maria", "cliente")).await;
    env.storage.add_contact(contact("I1", "Pedro", "lead")).await;

    let first = env.directory.contacts(&i1, Some(&clientes)).await?;
    assert_eq!(first.len(), 1);
    assert!(env.cache.contacts().get(&i1, Some(&clientes)).is_some());

    env.storage.add_contact(contact("I1", "Ana", "cliente")).await;
    env.directory.invalidate_contacts(&i1);

    assert!(env.cache.contacts().get(&i1, Some(&clientes)).is_none());
    let refreshed = env.directory.contacts(&i1, Some(&clientes)).await?;
    assert_eq!(refreshed.len(), 2);
    assert_eq!(env.storage.contact_fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn invalidation_leaves_other_instances_cached() -> anyhow::Result<()> {
    let env = fixture();
    let i1 = InstanceId::from("I1");
    let i10 = InstanceId::from("I10");
    env.storage.add_contact(contact("I10", "Joana", "lead")).await;

    env.directory.contacts(&i1, None).await?;
    env.directory.contacts(&i10, None).await?;
    assert_eq!(env.directory.invalidate_contacts(&i1), 1);

    env.directory.contacts(&i10, None).await?;
    assert_eq!(env.storage.contact_fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn contact_lists_refetch_after_short_ttl() -> anyhow::Result<()> {
    let env = fixture();
    let i1 = InstanceId::from("I1");

    env.directory.contacts(&i1, None).await?;
    env.clock.advance(CONTACTS_TTL);
    env.directory.contacts(&i1, None).await?;
    assert_eq!(env.storage.contact_fetches(), 1);

    env.clock.advance(Duration::from_secs(1));
    env.directory.contacts(&i1, None).await?;
    assert_eq!(env.storage.contact_fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn quick_messages_invalidate_on_write() -> anyhow::Result<()> {
    let env = fixture();
    env.storage
        .put_quick_messages(vec![QuickMessage {
            id: Uuid::new_v4(),
            shortcut: "ola".to_string(),
            content: "Olá! Como posso ajudar?".to_string(),
        }])
        .await;

    assert_eq!(env.directory.quick_messages().await?.len(), 1);
    env.storage.put_quick_messages(Vec::new()).await;
    assert_eq!(env.directory.quick_messages().await?.len(), 1);

    env.directory.invalidate_quick_messages();
    assert!(env.directory.quick_messages().await?.is_empty());
    assert_eq!(env.storage.quick_message_fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn storage_errors_propagate_and_leave_cache_empty() {
    let env = fixture();
    env.storage.inject_fetch_error("connection refused").await;

    let error = env.directory.quick_messages().await.expect_err("fetch should fail");

    assert_eq!(error.to_string(), "Storage error: connection refused");
    assert!(env.cache.store().is_empty());
}
