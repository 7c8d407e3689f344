//! Benchmarks for hybrid cache operations
//!
//! Runs over in-process memory backends, so the numbers measure the routing
//! and fan-out overhead rather than network latency:
//! - Write fan-out to one vs. two backends
//! - Reads hitting local, falling through to cloud, and missing
//! - Health check ticks
//! - Compute-on-miss under concurrency

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hybrid_cache::backends::MemoryStore;
use hybrid_cache::{HybridCacheBuilder, HybridCacheConfig, HybridCacheManager, KvStore};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Cache over two memory stores, already initialized
fn setup_cache(config: HybridCacheConfig) -> (HybridCacheManager, MemoryStore, MemoryStore, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"));
    let local = MemoryStore::new();
    let cloud = MemoryStore::new();
    let cache = HybridCacheBuilder::new()
        .with_config(config)
        .with_local_connector(Arc::new(local.connector()))
        .with_cloud_connector(Arc::new(cloud.connector()))
        .build()
        .unwrap_or_else(|_| panic!("Failed to build hybrid cache"));
    rt.block_on(async {
        cache
            .initialize()
            .await
            .unwrap_or_else(|_| panic!("Failed to initialize hybrid cache"));
    });
    (cache, local, cloud, rt)
}

/// Benchmark writes with and without fan-out
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_set");

    for write_both in [true, false] {
        let (cache, _local, _cloud, rt) = setup_cache(HybridCacheConfig {
            write_both,
            ..HybridCacheConfig::default()
        });
        let value = "x".repeat(1024);

        group.bench_with_input(
            BenchmarkId::new("write_both", write_both),
            &write_both,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let key = format!("bench:set:{}", rand::random::<u32>());
                        cache
                            .set(&key, black_box(&value), None)
                            .await
                            .unwrap_or_else(|_| panic!("Failed to set cache"));
                    });
                });
            },
        );
    }

    group.finish();
}

/// Benchmark read paths: local hit, cloud fallthrough, miss
fn bench_get(c: &mut Criterion) {
    let (cache, _local, cloud, rt) = setup_cache(HybridCacheConfig::default());
    let mut group = c.benchmark_group("hybrid_get");

    rt.block_on(async {
        cache
            .set("bench:local_hit", "value", None)
            .await
            .unwrap_or_else(|_| panic!("Failed to set cache"));
        cloud
            .set("bench:cloud_hit", "value", None)
            .await
            .unwrap_or_else(|_| panic!("Failed to seed cloud"));
    });

    for (name, key) in [
        ("local_hit", "bench:local_hit"),
        ("cloud_hit", "bench:cloud_hit"),
        ("miss", "bench:miss"),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let value = cache.get(black_box(key)).await;
                    black_box(value)
                })
            });
        });
    }

    group.finish();
}

/// Benchmark one probe round over both backends
fn bench_health_check(c: &mut Criterion) {
    let (cache, _local, _cloud, rt) = setup_cache(HybridCacheConfig::default());

    c.bench_function("check_health", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(cache.check_health().await)
            })
        });
    });
}

/// Benchmark coalesced compute-on-miss
fn bench_get_or_compute(c: &mut Criterion) {
    let (cache, _local, _cloud, rt) = setup_cache(HybridCacheConfig::default());
    let cache = Arc::new(cache);

    c.bench_function("get_or_compute_50_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:compute:{}", rand::random::<u32>());
                let mut handles = Vec::with_capacity(50);

                for _ in 0..50 {
                    let cache = Arc::clone(&cache);
                    let key = key.clone();
                    handles.push(tokio::spawn(async move {
                        cache
                            .get_or_compute(&key, None, || async { Ok("computed".to_string()) })
                            .await
                    }));
                }

                for handle in handles {
                    let _ = black_box(handle.await);
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_health_check,
    bench_get_or_compute
);
criterion_main!(benches);
