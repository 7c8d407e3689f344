//! Health Monitoring Example
//!
//! Demonstrates the background health monitor following a backend that goes
//! down and comes back.
//!
//! Run with: cargo run --example `health_monitoring`

use hybrid_cache::backends::MemoryStore;
use hybrid_cache::{HybridCacheBuilder, HybridCacheConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!("=== Hybrid Cache: Health Monitoring ===\n");

    let local = MemoryStore::new();
    let cloud = MemoryStore::new();
    let config = HybridCacheConfig {
        health_check_interval: Duration::from_millis(500),
        ..HybridCacheConfig::default()
    };
    let cache = HybridCacheBuilder::new()
        .with_config(config)
        .with_local_connector(Arc::new(local.connector()))
        .with_cloud_connector(Arc::new(cloud.connector()))
        .build()?;
    cache.initialize().await?;

    println!("Watching health for 10 checks; cloud goes down at #3 and back at #7\n");

    for i in 1..=10 {
        match i {
            3 => cloud.set_reachable(false),
            7 => cloud.set_reachable(true),
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        let health = cache.get_health();
        println!("Health Check #{i}");
        println!(
            "   local: {}   cloud: {}",
            if health.local.healthy { "✅ HEALTHY" } else { "⚠️  DOWN" },
            if health.cloud.healthy { "✅ HEALTHY" } else { "⚠️  DOWN" },
        );

        // Writes keep working as long as one backend does
        let key = format!("demo:health:{i}");
        match cache.set(&key, "value", Some(Duration::from_secs(60))).await {
            Ok(()) => println!("   write: ok"),
            Err(e) => println!("   write: failed ({e})"),
        }
        println!();
    }

    let stats = cache.get_stats();
    println!("📊 Cloud backend:");
    println!("   - Probes: {}", stats.cloud.probes);
    println!("   - Probe failures: {}", stats.cloud.probe_failures);
    println!("   - Lost: {}", stats.cloud.lost);
    println!("   - Recovered: {}", stats.cloud.recovered);
    println!("\n{}", serde_json::to_string_pretty(&cache.get_health())?);

    cache.disconnect().await;
    println!("\n✅ Health monitoring complete!");
    Ok(())
}
