//! Integration tests against live Redis servers
//!
//! Ignored by default. Run with a local Redis on 127.0.0.1:6379 (and
//! optionally `CLOUD_REDIS_HOST`/`CLOUD_REDIS_PORT` pointing elsewhere):
//!
//! ```text
//! cargo test --test integration_redis -- --ignored
//! ```
#![cfg(feature = "redis")]

mod common;

use common::test_key;
use hybrid_cache::{
    BackendConfig, Connector, HybridCacheConfig, HybridCacheManager, KvStore, RedisConnector,
    RetryPolicy,
};
use std::time::Duration;

fn redis_backend(host_var: &str, port_var: &str) -> BackendConfig {
    let host = std::env::var(host_var).unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var(port_var)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379);
    BackendConfig::new(host, port).with_retry(RetryPolicy::no_retry())
}

fn setup_redis() -> HybridCacheManager {
    let config = HybridCacheConfig {
        local: Some(redis_backend("LOCAL_REDIS_HOST", "LOCAL_REDIS_PORT")),
        cloud: Some(redis_backend("CLOUD_REDIS_HOST", "CLOUD_REDIS_PORT")),
        ..HybridCacheConfig::default()
    };
    HybridCacheManager::new(config).expect("Failed to build hybrid cache")
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_redis_connector_round_trip() {
    let connector = RedisConnector::new(redis_backend("LOCAL_REDIS_HOST", "LOCAL_REDIS_PORT"));
    let store = connector.connect().await.unwrap();
    let key = test_key("redis_store");

    store.ping().await.unwrap();
    store.set(&key, "v", Some(Duration::from_secs(10))).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some("v".to_string()));
    assert!(store.exists(&key).await.unwrap());
    store.delete(&key).await.unwrap();
    assert!(!store.exists(&key).await.unwrap());
    store.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_hybrid_cache_over_redis() {
    let cache = setup_redis();
    let key = test_key("redis_hybrid");

    cache.set(&key, "hello", Some(Duration::from_secs(30))).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some("hello".to_string()));

    let health = cache.check_health().await.unwrap();
    assert!(health.local.healthy);

    cache.delete(&key).await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), None);
    cache.disconnect().await;
}

#[tokio::test]
#[ignore = "requires network access to fail fast on an unroutable address"]
async fn test_unreachable_redis_is_unhealthy() {
    let mut backend = BackendConfig::new("10.255.255.1", 6379).with_retry(RetryPolicy::no_retry());
    backend.connect_timeout = Duration::from_millis(300);
    let config = HybridCacheConfig {
        local: Some(backend),
        ..HybridCacheConfig::default()
    };
    let cache = HybridCacheManager::new(config).unwrap();

    cache.initialize().await.unwrap();
    assert!(!cache.get_health().local.healthy);
    assert_eq!(cache.get("k").await.unwrap(), None);
    cache.disconnect().await;
}
