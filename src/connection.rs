//! Backend Connection
//!
//! One physical backend (`local` or `cloud`) together with its retry policy
//! and live health state.
//!
//! ```text
//! Uninitialized ──connect()──▶ Connecting ──▶ Healthy ◀──probe()──▶ Unhealthy
//!        │                         │             │                     │
//!        └─────────────────────────┴──close()────┴─────────────────────┴──▶ Closed
//! ```
//!
//! Health only changes through [`next_state`], called from both the connect
//! path and the probe path, so the transition rules live in one place.

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::retry::RetryPolicy;
use crate::traits::{Connector, KvStore};

/// Which backend a connection represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Low-latency backend
    Local,
    /// Durable backend
    Cloud,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a [`BackendConnection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Healthy,
    Unhealthy,
    /// Terminal
    Closed,
}

/// Observable health change produced by [`next_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First successful connect
    Connected,
    /// Initial connect failed
    ConnectFailed,
    /// Unhealthy backend answered again
    Recovered,
    /// Healthy backend stopped answering
    Lost,
}

/// Health state machine
///
/// Returns the new state and, when the outcome changed health, the
/// transition to report. Repeating the same outcome yields `None`.
/// A backend that is not `available` never becomes healthy, and `Closed`
/// never changes.
#[must_use]
pub fn next_state(
    current: ConnectionState,
    available: bool,
    success: bool,
) -> (ConnectionState, Option<Transition>) {
    use ConnectionState::{Closed, Connecting, Healthy, Uninitialized, Unhealthy};

    if current == Closed || !available {
        return (current, None);
    }
    match (current, success) {
        (Uninitialized | Connecting, true) => (Healthy, Some(Transition::Connected)),
        (Uninitialized | Connecting, false) => (Unhealthy, Some(Transition::ConnectFailed)),
        (Unhealthy, true) => (Healthy, Some(Transition::Recovered)),
        (Healthy, false) => (Unhealthy, Some(Transition::Lost)),
        (state, _) => (state, None),
    }
}

/// Timing and retry settings of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&BackendConfig> for ConnectionSettings {
    fn from(config: &BackendConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            probe_timeout: config.probe_timeout,
            retry: config.retry,
        }
    }
}

/// `available`/`healthy` pair reported by [`HybridCacheManager::get_health`](crate::HybridCacheManager::get_health)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    /// Backend was configured
    pub available: bool,
    /// Last connect/probe outcome was a success
    pub healthy: bool,
}

/// Per-connection counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStats {
    pub role: Role,
    pub state: ConnectionState,
    pub connect_attempts: u64,
    pub probes: u64,
    pub probe_failures: u64,
    pub lost: u64,
    pub recovered: u64,
    pub operation_failures: u64,
}

#[derive(Debug, Default)]
struct AtomicBackendStats {
    connect_attempts: AtomicU64,
    probes: AtomicU64,
    probe_failures: AtomicU64,
    lost: AtomicU64,
    recovered: AtomicU64,
    operation_failures: AtomicU64,
}

/// Direct access to one connected backend
///
/// Returned by `get_client`/`get_clients`. Operations go straight to the
/// store: no fan-out, no fallback, errors are returned as-is.
#[derive(Clone)]
pub struct BackendHandle {
    role: Role,
    store: Arc<dyn KvStore>,
}

impl BackendHandle {
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// # Errors
    ///
    /// Returns the store's error if the command fails.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key).await
    }

    /// # Errors
    ///
    /// Returns the store's error if the command fails.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.store.set(key, value, ttl).await
    }

    /// # Errors
    ///
    /// Returns the store's error if the command fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// # Errors
    ///
    /// Returns the store's error if the command fails.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.store.exists(key).await
    }

    /// # Errors
    ///
    /// Returns the store's error if the backend does not answer.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("role", &self.role)
            .field("store", &self.store.name())
            .finish()
    }
}

/// One backend and its health
pub struct BackendConnection {
    role: Role,
    /// `None` when the backend is not configured
    connector: Option<Arc<dyn Connector>>,
    settings: ConnectionSettings,
    state: Mutex<ConnectionState>,
    store: RwLock<Option<Arc<dyn KvStore>>>,
    stats: AtomicBackendStats,
}

impl BackendConnection {
    /// A configured backend reached through `connector`
    pub fn new(role: Role, connector: Arc<dyn Connector>, settings: ConnectionSettings) -> Self {
        Self {
            role,
            connector: Some(connector),
            settings,
            state: Mutex::new(ConnectionState::Uninitialized),
            store: RwLock::new(None),
            stats: AtomicBackendStats::default(),
        }
    }

    /// A backend that was not configured; never healthy
    #[must_use]
    pub fn unconfigured(role: Role) -> Self {
        Self {
            role,
            connector: None,
            settings: ConnectionSettings::default(),
            state: Mutex::new(ConnectionState::Uninitialized),
            store: RwLock::new(None),
            stats: AtomicBackendStats::default(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the backend was configured at all
    #[must_use]
    pub fn available(&self) -> bool {
        self.connector.is_some()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    #[must_use]
    pub fn healthy(&self) -> bool {
        self.state() == ConnectionState::Healthy
    }

    #[must_use]
    pub fn health(&self) -> BackendHealth {
        BackendHealth {
            available: self.available(),
            healthy: self.healthy(),
        }
    }

    /// Handle to the store, only while healthy
    #[must_use]
    pub fn handle(&self) -> Option<BackendHandle> {
        if !self.healthy() {
            return None;
        }
        self.store.read().as_ref().map(|store| BackendHandle {
            role: self.role,
            store: Arc::clone(store),
        })
    }

    /// Feed one connect/probe outcome through the state machine
    ///
    /// Logs and counts the resulting transition, if any.
    pub fn on_probe_result(&self, success: bool) -> Option<Transition> {
        let transition = {
            let mut state = self.state.lock();
            let (next, transition) = next_state(*state, self.available(), success);
            *state = next;
            transition
        };

        match transition {
            Some(Transition::Connected) => info!(role = %self.role, "backend connected"),
            Some(Transition::ConnectFailed) => {
                warn!(role = %self.role, "backend connect failed, will retry on health probes");
            }
            Some(Transition::Recovered) => {
                self.stats.recovered.fetch_add(1, Ordering::Relaxed);
                info!(role = %self.role, "backend connection recovered");
            }
            Some(Transition::Lost) => {
                self.stats.lost.fetch_add(1, Ordering::Relaxed);
                warn!(role = %self.role, "backend connection lost");
            }
            None => {}
        }
        transition
    }

    /// Establish the connection using the retry policy
    ///
    /// Never fails: on exhausting retries the backend is left unhealthy and
    /// the health monitor keeps trying. Returns whether it is now healthy.
    /// A call made while another connect is still running returns `false`
    /// without attempting anything.
    pub async fn connect(&self) -> bool {
        let Some(connector) = self.connector.as_ref() else {
            debug!(role = %self.role, "backend not configured, skipping connect");
            return false;
        };
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Closed => return false,
                // Another connect is in flight; it owns the attempts
                ConnectionState::Connecting => return false,
                ConnectionState::Uninitialized => *state = ConnectionState::Connecting,
                _ => {}
            }
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt_connect(connector.as_ref(), self.settings.connect_timeout).await {
                Ok(()) => break,
                Err(_) if self.state() == ConnectionState::Closed => return false,
                Err(e) => {
                    warn!(
                        role = %self.role,
                        target = %connector.describe(),
                        attempt,
                        error = %e,
                        "backend connect attempt failed"
                    );
                    match self.settings.retry.delay_for(attempt) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            self.on_probe_result(false);
                            return false;
                        }
                    }
                }
            }
        }
        self.on_probe_result(true);
        self.healthy()
    }

    /// One liveness check
    ///
    /// Pings the store, or tries a single reconnect when the initial connect
    /// never succeeded. Bounded by the probe timeout.
    pub async fn probe(&self) -> bool {
        let Some(connector) = self.connector.as_ref() else {
            return false;
        };
        if self.state() == ConnectionState::Closed {
            return false;
        }
        self.stats.probes.fetch_add(1, Ordering::Relaxed);

        let store = self.store.read().clone();
        let outcome = match store {
            Some(store) => tokio::time::timeout(self.settings.probe_timeout, store.ping())
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("ping timed out"))),
            None => self.attempt_connect(connector.as_ref(), self.settings.probe_timeout).await,
        };

        if let Err(e) = &outcome {
            self.stats.probe_failures.fetch_add(1, Ordering::Relaxed);
            debug!(role = %self.role, error = %e, "backend probe failed");
        }
        self.on_probe_result(outcome.is_ok());
        self.healthy()
    }

    /// Release the connection. Safe to call repeatedly or before connect.
    pub async fn close(&self) {
        *self.state.lock() = ConnectionState::Closed;
        let store = self.store.write().take();
        if let Some(store) = store {
            if let Err(e) = store.close().await {
                warn!(role = %self.role, error = %e, "backend close failed");
            } else {
                info!(role = %self.role, "backend connection closed");
            }
        }
    }

    /// Count an operation failure surfaced by the facade
    pub(crate) fn record_operation_failure(&self) {
        self.stats.operation_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            role: self.role,
            state: self.state(),
            connect_attempts: self.stats.connect_attempts.load(Ordering::Relaxed),
            probes: self.stats.probes.load(Ordering::Relaxed),
            probe_failures: self.stats.probe_failures.load(Ordering::Relaxed),
            lost: self.stats.lost.load(Ordering::Relaxed),
            recovered: self.stats.recovered.load(Ordering::Relaxed),
            operation_failures: self.stats.operation_failures.load(Ordering::Relaxed),
        }
    }

    async fn attempt_connect(&self, connector: &dyn Connector, limit: Duration) -> Result<()> {
        self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        let store = tokio::time::timeout(limit, connector.connect())
            .await
            .map_err(|_| anyhow::anyhow!("connect timed out after {limit:?}"))??;

        // close() may have run while we were connecting; don't resurrect the store
        let rejected = {
            let mut slot = self.store.write();
            if self.state() == ConnectionState::Closed {
                Some(store)
            } else {
                *slot = Some(store);
                None
            }
        };
        if let Some(store) = rejected {
            store.close().await?;
            anyhow::bail!("connection closed during connect");
        }
        Ok(())
    }
}

impl fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConnection")
            .field("role", &self.role)
            .field("available", &self.available())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use ConnectionState::{Closed, Connecting, Healthy, Uninitialized, Unhealthy};

    fn fast_settings() -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(100),
            retry: RetryPolicy {
                max_attempts: 3,
                step: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    #[test]
    fn test_next_state_transitions() {
        assert_eq!(next_state(Connecting, true, true), (Healthy, Some(Transition::Connected)));
        assert_eq!(
            next_state(Connecting, true, false),
            (Unhealthy, Some(Transition::ConnectFailed))
        );
        assert_eq!(next_state(Healthy, true, false), (Unhealthy, Some(Transition::Lost)));
        assert_eq!(next_state(Unhealthy, true, true), (Healthy, Some(Transition::Recovered)));
    }

    #[test]
    fn test_next_state_no_op_transitions() {
        assert_eq!(next_state(Healthy, true, true), (Healthy, None));
        assert_eq!(next_state(Unhealthy, true, false), (Unhealthy, None));
    }

    #[test]
    fn test_closed_is_terminal_and_unavailable_never_healthy() {
        assert_eq!(next_state(Closed, true, true), (Closed, None));
        assert_eq!(next_state(Uninitialized, false, true), (Uninitialized, None));
        assert_eq!(next_state(Unhealthy, false, true), (Unhealthy, None));
    }

    #[tokio::test]
    async fn test_connect_success() {
        let server = MemoryStore::new();
        let conn = BackendConnection::new(Role::Local, Arc::new(server.connector()), fast_settings());

        assert!(conn.connect().await);
        assert_eq!(conn.state(), Healthy);
        assert!(conn.handle().is_some());
        assert_eq!(conn.stats().connect_attempts, 1);
    }

    #[tokio::test]
    async fn test_overlapping_connect_does_not_restart() {
        let server = MemoryStore::new();
        server.set_latency(Some(Duration::from_millis(50)));
        let conn = BackendConnection::new(Role::Local, Arc::new(server.connector()), fast_settings());

        let (first, second) = tokio::join!(conn.connect(), conn.connect());
        assert!(first);
        assert!(!second);
        assert_eq!(conn.state(), Healthy);
        assert_eq!(conn.stats().connect_attempts, 1);
        assert_eq!(server.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_exhausts_retries_without_error() {
        let server = MemoryStore::new();
        server.set_reachable(false);
        let conn = BackendConnection::new(Role::Cloud, Arc::new(server.connector()), fast_settings());

        assert!(!conn.connect().await);
        assert_eq!(conn.state(), Unhealthy);
        assert!(conn.handle().is_none());
        assert_eq!(conn.stats().connect_attempts, 3);
    }

    #[tokio::test]
    async fn test_probe_reconnects_after_failed_boot() {
        let server = MemoryStore::new();
        server.set_reachable(false);
        let conn = BackendConnection::new(Role::Cloud, Arc::new(server.connector()), fast_settings());
        conn.connect().await;

        server.set_reachable(true);
        assert!(conn.probe().await);
        assert_eq!(conn.stats().recovered, 1);
        assert!(conn.handle().is_some());
    }

    #[tokio::test]
    async fn test_probe_counts_transitions_once() {
        let server = MemoryStore::new();
        let conn = BackendConnection::new(Role::Local, Arc::new(server.connector()), fast_settings());
        conn.connect().await;

        server.set_reachable(false);
        for _ in 0..3 {
            assert!(!conn.probe().await);
        }
        assert_eq!(conn.stats().lost, 1);
        assert_eq!(conn.stats().probe_failures, 3);

        server.set_reachable(true);
        assert!(conn.probe().await);
        assert!(conn.probe().await);
        assert_eq!(conn.stats().recovered, 1);
    }

    #[tokio::test]
    async fn test_probe_times_out_on_slow_backend() {
        let server = MemoryStore::new();
        let conn = BackendConnection::new(Role::Local, Arc::new(server.connector()), fast_settings());
        conn.connect().await;

        server.set_latency(Some(Duration::from_secs(5)));
        let started = std::time::Instant::now();
        assert!(!conn.probe().await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unconfigured_connection() {
        let conn = BackendConnection::unconfigured(Role::Cloud);
        assert!(!conn.connect().await);
        assert!(!conn.probe().await);
        assert_eq!(conn.health(), BackendHealth { available: false, healthy: false });
        assert!(conn.on_probe_result(true).is_none());
        conn.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_terminal() {
        let server = MemoryStore::new();
        let conn = BackendConnection::new(Role::Local, Arc::new(server.connector()), fast_settings());
        conn.connect().await;

        conn.close().await;
        conn.close().await;
        assert_eq!(conn.state(), Closed);
        assert!(!conn.probe().await);
        assert!(!conn.connect().await);
        assert!(conn.handle().is_none());
    }
}
