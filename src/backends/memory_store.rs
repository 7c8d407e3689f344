//! Memory Store - In-Process Key/Value Backend
//!
//! A `DashMap`-backed store that behaves like a tiny key/value server:
//! connections are opened through [`MemoryConnector`], entries carry optional
//! TTLs, and the "server" can be made unreachable or slow at runtime. Used for
//! tests, benches and demos, and as a stand-in backend for single-process
//! deployments.

use anyhow::{Result, bail};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::traits::{Connector, KvStore};

/// Stored value with expiration tracking
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// Server-side state shared by every connection to the same store
#[derive(Debug, Default)]
struct Shared {
    map: DashMap<String, Entry>,
    unreachable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    connects: AtomicU64,
    pings: AtomicU64,
}

/// In-process key/value store
///
/// Cloning a `MemoryStore` yields another handle to the same data. The
/// handle returned by [`MemoryStore::new`] acts as the server side: it keeps
/// working regardless of [`set_reachable`](Self::set_reachable), which only
/// affects connections made through a [`MemoryConnector`].
///
/// **Example**:
/// ```rust
/// use hybrid_cache::backends::MemoryStore;
/// use hybrid_cache::KvStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = MemoryStore::new();
/// store.set("user:1", "alice", None).await?;
/// assert_eq!(store.get("user:1").await?, Some("alice".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    /// `true` for handles handed out by a connector (subject to fault injection)
    remote: bool,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new, empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector opening connections to this store
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            store: self.clone(),
        }
    }

    /// Make the store reachable or unreachable for connections
    ///
    /// While unreachable, connect attempts and every operation on a connection
    /// fail, as if the network to the server were down.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Delay applied to every operation on a connection (`None` to clear)
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.shared.latency.lock() = latency;
    }

    /// Number of successful connects made through a connector
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.shared.connects.load(Ordering::Relaxed)
    }

    /// Number of pings received on connections
    #[must_use]
    pub fn ping_count(&self) -> u64 {
        self.shared.pings.load(Ordering::Relaxed)
    }

    /// Number of live (non-expired) entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.map.iter().filter(|e| !e.is_expired()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.shared.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[Memory] Cleaned up expired entries");
        }
        removed
    }

    /// Simulated network round trip for connection handles
    async fn round_trip(&self) -> Result<()> {
        if !self.remote {
            return Ok(());
        }
        if self.closed.load(Ordering::SeqCst) {
            bail!("memory store connection is closed");
        }
        let latency = *self.shared.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.shared.unreachable.load(Ordering::SeqCst) {
            bail!("memory store is unreachable");
        }
        Ok(())
    }

    fn live_entry(&self, key: &str) -> Option<Entry> {
        let entry = self.shared.map.get(key)?;
        if entry.is_expired() {
            // Release the shard read lock before removing
            drop(entry);
            self.shared.map.remove(key);
            return None;
        }
        Some(entry.clone())
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.round_trip().await?;
        Ok(self.live_entry(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.round_trip().await?;
        self.shared.map.insert(key.to_string(), Entry::new(value, ttl));
        debug!(key = %key, ttl_secs = ?ttl.map(|t| t.as_secs()), "[Memory] Stored key");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.round_trip().await?;
        self.shared.map.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.round_trip().await?;
        Ok(self.live_entry(key).is_some())
    }

    async fn ping(&self) -> Result<()> {
        if self.remote {
            self.shared.pings.fetch_add(1, Ordering::Relaxed);
        }
        self.round_trip().await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// [`Connector`] for a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: MemoryStore,
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn KvStore>> {
        let latency = *self.store.shared.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.store.shared.unreachable.load(Ordering::SeqCst) {
            bail!("connection refused: memory store is unreachable");
        }
        self.store.shared.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryStore {
            shared: Arc::clone(&self.store.shared),
            remote: true,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // Deleting again is fine
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("short", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.set("forever", "v", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.exists("short").await.unwrap());
        assert!(store.exists("forever").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_affects_connections_only() {
        let server = MemoryStore::new();
        let conn = server.connector().connect().await.unwrap();
        conn.set("k", "v", None).await.unwrap();

        server.set_reachable(false);
        assert!(conn.get("k").await.is_err());
        assert!(conn.ping().await.is_err());
        assert!(server.connector().connect().await.is_err());
        assert_eq!(server.get("k").await.unwrap(), Some("v".to_string()));

        server.set_reachable(true);
        assert_eq!(conn.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(server.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_operations() {
        let server = MemoryStore::new();
        let conn = server.connector().connect().await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.get("k").await.is_err());
        assert!(server.get("k").await.is_ok());
    }
}
