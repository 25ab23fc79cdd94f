//! Property-based tests for expiry and sweep invariants.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use switchboard_cache::{facade::ContactListCache, CacheStore, ExpiringStore};
use switchboard_core::{ContactFilters, InstanceId, TestClock};

/// Keys with their TTL in seconds.
fn entries_strategy() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::hash_map("[a-z]{1,8}", 1u64..600, 1..40)
        .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn value_visible_exactly_within_ttl(ttl in 1u64..10_000, elapsed in 0u64..20_000) {
        let clock = TestClock::new();
        let store: ExpiringStore<u64> = ExpiringStore::new(Arc::new(clock.clone()));
        store.set_with_ttl("k", 7, Duration::from_secs(ttl));

        clock.advance(Duration::from_secs(elapsed));

        prop_assert_eq!(store.get("k").is_some(), elapsed <= ttl);
    }

    #[test]
    fn sweep_removes_exactly_elapsed_entries(entries in entries_strategy(), elapsed in 0u64..700) {
        let clock = TestClock::new();
        let store: ExpiringStore<u64> = ExpiringStore::new(Arc::new(clock.clone()));
        for (key, ttl) in &entries {
            store.set_with_ttl(key.clone(), *ttl, Duration::from_secs(*ttl));
        }
        clock.advance(Duration::from_secs(elapsed));

        let expected_expired = entries.iter().filter(|(_, ttl)| elapsed > *ttl).count();
        let stats = store.stats();
        prop_assert_eq!(stats.total, entries.len());
        prop_assert_eq!(stats.expired, expected_expired);
        prop_assert_eq!(stats.valid + stats.expired, stats.total);

        prop_assert_eq!(store.sweep(), expected_expired);
        prop_assert_eq!(store.len(), entries.len() - expected_expired);
        prop_assert_eq!(store.stats().expired, 0);
    }

    #[test]
    fn clear_instance_removes_only_that_instance(
        instances in prop::collection::btree_set("I[0-9]{1,3}", 1..8),
        target_index in any::<prop::sample::Index>(),
    ) {
        let clock = TestClock::new();
        let store = Arc::new(CacheStore::new(Arc::new(clock)));
        let contacts = ContactListCache::new(store.clone());
        let instances: Vec<InstanceId> = instances.into_iter().map(InstanceId::from).collect();
        let leads = ContactFilters::new().with("type", "lead");
        for instance in &instances {
            contacts.set(instance, &[], None);
            contacts.set(instance, &[], Some(&leads));
        }
        let target = target_index.get(&instances).clone();

        prop_assert_eq!(contacts.clear_instance(&target), 2);

        for instance in &instances {
            let cached = contacts.get(instance, None).is_some();
            prop_assert_eq!(cached, *instance != target);
        }
    }
}
