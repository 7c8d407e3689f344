//! Backend Store Traits
//!
//! The hybrid cache is a client of whatever protocol its two backends speak.
//! These traits are the seam: a [`Connector`] knows how to establish a
//! connection, and the resulting [`KvStore`] exposes the opaque key/value
//! primitives (`get/set/delete/exists/ping`).
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use hybrid_cache::{KvStore, Connector, async_trait};
//! use std::{sync::Arc, time::Duration};
//! use anyhow::Result;
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl KvStore for MyStore {
//!     async fn get(&self, key: &str) -> Result<Option<String>> { todo!() }
//!     async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> { todo!() }
//!     async fn delete(&self, key: &str) -> Result<()> { todo!() }
//!     async fn exists(&self, key: &str) -> Result<bool> { todo!() }
//!     async fn ping(&self) -> Result<()> { todo!() }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> Result<Arc<dyn KvStore>> {
//!         Ok(Arc::new(MyStore { /* ... */ }))
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One established connection to a key/value store
///
/// Errors returned here are internal connection errors: the hybrid cache
/// logs them and converts them into health state, they never reach callers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a store is shared by the facade,
/// the health monitor and callers holding a [`BackendHandle`](crate::BackendHandle).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get value by key
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` - key present
    /// * `Ok(None)` - key absent or expired
    /// * `Err(e)` - the store could not answer
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, with an optional time-to-live (`None` = no expiry)
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether the key is present
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Lightweight liveness check (echo/ping)
    async fn ping(&self) -> Result<()>;

    /// Release the underlying connection. Must be idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Name used in logs (e.g. "Redis", "Memory")
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Factory establishing connections to one backend
///
/// Called once per connect attempt; retry and backoff are applied by the
/// caller, so a single call should make a single attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Make one connection attempt
    async fn connect(&self) -> Result<Arc<dyn KvStore>>;

    /// Human-readable target for logs. Must not contain credentials.
    fn describe(&self) -> String {
        "unknown".to_string()
    }
}
