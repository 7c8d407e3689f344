//! Hybrid Cache
//!
//! One logical key/value cache over two independent backends:
//! - **Local**: low-latency instance (e.g. a Redis next to the app)
//! - **Cloud**: durable instance (e.g. a managed Redis)
//!
//! The cache keeps working when either backend is unreachable:
//! - **Health Monitoring**: both backends are probed concurrently on a fixed interval
//! - **Fail-Safe Reads**: `get`/`exists` degrade to a miss, never an error
//! - **Write Fan-Out**: `set`/`delete` go to every healthy backend concurrently
//! - **Opportunistic Sync**: optional backfill of the backend that missed a read
//! - **Single-Flight Initialization**: connects once, however many callers race
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hybrid_cache::{BackendConfig, HybridCacheConfig, HybridCacheManager};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HybridCacheConfig {
//!         local: Some(BackendConfig::new("127.0.0.1", 6379)),
//!         cloud: Some(BackendConfig::new("cache.example.com", 6380).with_tls(true)),
//!         ..HybridCacheConfig::default()
//!     };
//!     let cache = HybridCacheManager::new(config)?;
//!
//!     cache.set("user:1", r#"{"name":"alice"}"#, Some(Duration::from_secs(300))).await?;
//!     if let Some(cached) = cache.get("user:1").await? {
//!         tracing::info!("Cached data: {}", cached);
//!     }
//!
//!     let health = cache.get_health();
//!     tracing::info!(local = health.local.healthy, cloud = health.cloud.healthy, "Backend health");
//!
//!     cache.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! caller → HybridCacheManager ─(first use)→ initialize (single-flight)
//!               │ reads health flags
//!               ├──────────────▶ local  BackendConnection ◀─┐
//!               └──────────────▶ cloud  BackendConnection ◀─┴─ HealthMonitor (every 30s)
//! ```

pub mod backends;
pub mod builder;
pub mod cache_manager;
pub mod config;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod global;
pub mod health;
pub mod retry;
pub mod traits;

pub use backends::{MemoryConnector, MemoryStore};
#[cfg(feature = "redis")]
pub use backends::{RedisConnector, RedisStore};
pub use builder::HybridCacheBuilder;
pub use cache_manager::{BackendClients, HybridCacheManager, HybridCacheStats};
pub use config::{BackendConfig, HybridCacheConfig, ReadPreference};
pub use connection::{
    BackendConnection, BackendHandle, BackendHealth, BackendStats, ConnectionSettings,
    ConnectionState, Role, Transition,
};
pub use error::{HybridCacheError, Result};
pub use health::{HealthMonitor, HealthReport};
pub use retry::RetryPolicy;
pub use traits::{Connector, KvStore};

// Re-export async_trait for custom backend implementors
pub use async_trait::async_trait;
