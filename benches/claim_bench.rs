//! Benchmarks for the store claim path.
//!
//! Covers insert throughput and the claim/success cycle a busy worker runs
//! in a tight loop, on both store backends.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use backwork::core::SchedulePayload;
use backwork::infra::store::{ClaimRequest, MemoryStore, SqliteStore, StoreAdapter};
use chrono::Utc;

fn payload(priority: i32) -> SchedulePayload {
    SchedulePayload {
        handler: "BenchJob".to_string(),
        args: vec![serde_json::json!("bench")],
        run_at: Utc::now(),
        queue: "default".to_string(),
        priority,
    }
}

fn claim_request() -> ClaimRequest {
    ClaimRequest {
        process_name: "bench-worker".to_string(),
        queue: None,
        max_runtime: Duration::from_secs(4 * 60 * 60),
    }
}

fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));

    for (name, store) in stores() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &store, |b, store| {
            b.to_async(&rt).iter(|| async {
                black_box(store.insert(payload(50)).await.unwrap());
            });
        });
    }
    group.finish();
}

fn bench_claim_cycle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("claim_success_cycle");
    group.throughput(Throughput::Elements(1));

    for (name, store) in stores() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &store, |b, store| {
            b.to_async(&rt).iter(|| async {
                let inserted = store.insert(payload(50)).await.unwrap();
                let claimed = store
                    .claim_next(&claim_request())
                    .await
                    .unwrap()
                    .expect("a claimable job exists");
                store.report_success(claimed.id).await.unwrap();
                black_box(inserted.id);
            });
        });
    }
    group.finish();
}

fn stores() -> Vec<(&'static str, Arc<dyn StoreAdapter>)> {
    vec![
        ("memory", Arc::new(MemoryStore::new()) as Arc<dyn StoreAdapter>),
        (
            "sqlite",
            Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn StoreAdapter>,
        ),
    ]
}

criterion_group!(benches, bench_insert, bench_claim_cycle);
criterion_main!(benches);
