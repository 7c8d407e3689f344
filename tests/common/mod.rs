//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - Hybrid cache fixtures over in-process memory backends
//! - Test key generators
//! - Polling helpers for fire-and-forget behavior
#![allow(dead_code)]

use hybrid_cache::backends::MemoryStore;
use hybrid_cache::{
    BackendConfig, HybridCacheBuilder, HybridCacheConfig, HybridCacheManager, RetryPolicy,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Generate a unique test key
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Backend settings with short timeouts and a single connect attempt
pub fn fast_backend() -> BackendConfig {
    let mut config = BackendConfig::new("memory", 1).with_retry(RetryPolicy::no_retry());
    config.connect_timeout = Duration::from_millis(200);
    config.probe_timeout = Duration::from_millis(100);
    config.command_timeout = Duration::from_millis(200);
    config
}

/// Hybrid cache wired to two memory stores
pub struct Fixture {
    pub cache: HybridCacheManager,
    pub local: MemoryStore,
    pub cloud: MemoryStore,
}

/// Build a fixture with both backends; `tweak` adjusts the policy options
pub fn setup_with<F>(tweak: F) -> Fixture
where
    F: FnOnce(&mut HybridCacheConfig),
{
    let local = MemoryStore::new();
    let cloud = MemoryStore::new();
    let mut config = HybridCacheConfig {
        local: Some(fast_backend()),
        cloud: Some(fast_backend()),
        ..HybridCacheConfig::default()
    };
    tweak(&mut config);

    let cache = HybridCacheBuilder::new()
        .with_config(config)
        .with_local_connector(Arc::new(local.connector()))
        .with_cloud_connector(Arc::new(cloud.connector()))
        .build()
        .expect("Failed to build hybrid cache");

    Fixture { cache, local, cloud }
}

/// Fixture with default policy options
pub fn setup() -> Fixture {
    setup_with(|_| {})
}

/// Hybrid cache with only a local backend configured
pub fn setup_local_only() -> (HybridCacheManager, MemoryStore) {
    let local = MemoryStore::new();
    let config = HybridCacheConfig {
        local: Some(fast_backend()),
        ..HybridCacheConfig::default()
    };
    let cache = HybridCacheBuilder::new()
        .with_config(config)
        .with_local_connector(Arc::new(local.connector()))
        .build()
        .expect("Failed to build hybrid cache");
    (cache, local)
}

/// Poll an async condition until it holds or the timeout elapses
pub async fn eventually<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("user");
        let key2 = test_key("user");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("test_user_"));
    }
}
