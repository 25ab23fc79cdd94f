//! Performance benchmarks for the TTL cache and the retry queue.
//!
//! Tracks the hot paths of the inbox:
//! - Cache hit and write latency under a populated store
//! - Sweep cost as the share of expired entries grows
//! - Prefix invalidation of contact lists
//! - Bulk retry throughput

use std::{hint::black_box, sync::Arc, time::Duration};

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use serde_json::json;
use switchboard_cache::{CacheStore, ContactListCache};
use switchboard_core::{Clock, ContactFilters, InstanceId, TestClock};
use switchboard_retry::SendError;
use switchboard_testing::{ContactBuilder, MessageBuilder, TestEnv};
use tokio::runtime::Runtime;

fn populated_store(entries: usize, clock: &TestClock) -> Arc<CacheStore> {
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let store = Arc::new(CacheStore::new(shared));
    for i in 0..entries {
        store.set(format!("key:{i}"), json!({ "id": i, "name": format!("entry {i}") }));
    }
    store
}

/// Benchmarks point reads and writes on a populated store.
fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    for size in [100, 10_000] {
        let clock = TestClock::new();
        let store = populated_store(size, &clock);

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, &size| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % size;
                black_box(store.get(&format!("key:{i}")))
            });
        });

        group.bench_with_input(BenchmarkId::new("set", size), &size, |b, _| {
            b.iter(|| store.set("hot", black_box(json!({ "unread": 3 }))));
        });
    }

    group.finish();
}

/// Benchmarks a full sweep with varying shares of expired entries.
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for expired_percent in [0usize, 50, 100] {
        group.bench_with_input(
            BenchmarkId::new("expired_percent", expired_percent),
            &expired_percent,
            |b, &percent| {
                b.iter_batched(
                    || {
                        let clock = TestClock::new();
                        let store = populated_store(10_000, &clock);
                        for i in 0..(10_000 * (100 - percent) / 100) {
                            store.set_with_ttl(
                                format!("key:{i}"),
                                json!(i),
                                Duration::from_secs(3600),
                            );
                        }
                        clock.advance(Duration::from_secs(301));
                        store
                    },
                    |store| black_box(store.sweep()),
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmarks invalidating every contact list of one instance among many.
fn bench_contact_invalidation(c: &mut Criterion) {
    c.bench_function("contacts/clear_instance", |b| {
        b.iter_batched(
            || {
                let clock = TestClock::new();
                let store = populated_store(5_000, &clock);
                let contacts = ContactListCache::new(store);
                let list = vec![ContactBuilder::new().build()];
                for instance in 0..50 {
                    let instance_id = InstanceId::from(format!("I{instance}"));
                    contacts.set(&instance_id, &list, None);
                    for contact_type in ["cliente", "lead", "fornecedor"] {
                        let filters = ContactFilters::new().with("type", contact_type);
                        contacts.set(&instance_id, &list, Some(&filters));
                    }
                }
                contacts
            },
            |contacts| black_box(contacts.clear_instance(&InstanceId::from("I1"))),
            BatchSize::LargeInput,
        );
    });
}

/// Benchmarks a bulk retry over a queue of failed messages.
fn bench_retry_all(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("retry_queue");
    group.sample_size(20);

    for queued in [10, 100] {
        group.bench_with_input(BenchmarkId::new("retry_all", queued), &queued, |b, &queued| {
            b.iter_batched(
                || {
                    rt.block_on(async {
                        let env = TestEnv::new();
                        for _ in 0..queued {
                            let message = MessageBuilder::new().build();
                            env.queue.enqueue(message, &SendError::timeout(30)).await;
                        }
                        env
                    })
                },
                |env| rt.block_on(async { black_box(env.queue.retry_all().await) }),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_store_operations,
    bench_sweep,
    bench_contact_invalidation,
    bench_retry_all,
);
criterion_main!(benches);
