//! Backend Store Implementations
//!
//! # Available Backends
//!
//! - **Redis** - network key/value store, used for both the local and the
//!   cloud role (feature `redis`, enabled by default)
//! - **Memory** - in-process `DashMap` store with fault injection, for tests,
//!   demos and single-process setups
//!
//! # Usage
//!
//! ```rust,no_run
//! use hybrid_cache::backends::RedisConnector;
//! use hybrid_cache::{BackendConfig, Connector};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let connector = RedisConnector::new(BackendConfig::new("127.0.0.1", 6379));
//! let store = connector.connect().await?;
//! store.ping().await?;
//! # Ok(())
//! # }
//! ```

pub mod memory_store;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use memory_store::{MemoryConnector, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConnector, RedisStore};
