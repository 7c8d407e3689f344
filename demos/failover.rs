//! Failover Example
//!
//! Demonstrates fail-safe reads, write fan-out and read-miss sync while the
//! local backend is unavailable.
//!
//! Run with: cargo run --example failover

use hybrid_cache::backends::MemoryStore;
use hybrid_cache::{HybridCacheBuilder, HybridCacheConfig, HybridCacheError, KvStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    user_id: u64,
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!("=== Hybrid Cache: Failover ===\n");

    let local = MemoryStore::new();
    let cloud = MemoryStore::new();
    let config = HybridCacheConfig {
        sync_on_read_miss: true,
        ..HybridCacheConfig::default()
    };
    let cache = HybridCacheBuilder::new()
        .with_config(config)
        .with_local_connector(Arc::new(local.connector()))
        .with_cloud_connector(Arc::new(cloud.connector()))
        .build()?;

    // 1. Both healthy: writes land everywhere
    let session = Session {
        user_id: 42,
        token: "abc123".to_string(),
    };
    cache.set_json("session:42", &session, Some(Duration::from_secs(300))).await?;
    println!("1. Stored session on both backends (local: {}, cloud: {})", local.len(), cloud.len());

    // 2. Local goes down: the next probe notices, writes go to cloud only
    local.set_reachable(false);
    let report = cache.check_health().await?;
    println!(
        "2. Local down -> local healthy: {}, cloud healthy: {}",
        report.local.healthy, report.cloud.healthy
    );
    cache.set("greeting", "hello from cloud", None).await?;
    println!("   Wrote 'greeting' with local down (cloud has it: {})", cloud.exists("greeting").await?);

    // 3. Local comes back empty-handed; a read falls through to cloud and syncs
    local.set_reachable(true);
    cache.check_health().await?;
    let greeting = cache.get("greeting").await?;
    println!("3. Local recovered, read 'greeting' -> {greeting:?}");
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("   Synced into local: {}", local.exists("greeting").await?);

    // 4. Everything down: reads miss, writes fail loudly
    local.set_reachable(false);
    cloud.set_reachable(false);
    cache.check_health().await?;
    println!("4. Both down -> get: {:?}", cache.get("greeting").await?);
    match cache.set("greeting", "lost", None).await {
        Err(HybridCacheError::NoBackendAvailable { operation }) => {
            println!("   set failed as expected: no backend available for {operation}");
        }
        other => println!("   unexpected set result: {other:?}"),
    }

    let stats = cache.get_stats();
    println!("\n📊 Statistics:");
    println!("   - Total requests: {}", stats.total_requests);
    println!("   - Local hits: {}", stats.local_hits);
    println!("   - Cloud hits: {}", stats.cloud_hits);
    println!("   - Misses: {}", stats.misses);
    println!("   - Backfills: {}", stats.backfills);

    cache.disconnect().await;
    println!("\n✅ Failover demo complete!");
    Ok(())
}
