//! Hybrid Cache Manager - Unified Cache Operations
//!
//! Routes get/set/delete/exists over the local and cloud backends using
//! their current health flags. Reads are fail-safe (a miss is always an
//! acceptable answer); writes fail loudly only when no backend can take them.

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::config::{HybridCacheConfig, ReadPreference};
use crate::connection::{BackendConnection, BackendHandle, BackendStats, Role};
use crate::error::{HybridCacheError, Result};
use crate::fanout::join_best_effort;
use crate::health::{HealthMonitor, HealthReport};

/// RAII cleanup guard for in-flight compute tracking
/// Removes the entry from the `DashMap` even on early return or panic
struct CleanupGuard<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// Healthy handles per role, as returned by `get_clients`
#[derive(Debug, Clone)]
pub struct BackendClients {
    pub local: Option<BackendHandle>,
    pub cloud: Option<BackendHandle>,
}

/// Hybrid cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct HybridCacheStats {
    pub total_requests: u64,
    pub local_hits: u64,
    pub cloud_hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Values copied into the backend that missed
    pub backfills: u64,
    /// Individual backend writes/deletes that failed
    pub write_failures: u64,
    /// Compute-on-miss callers that waited for another caller's computation
    pub coalesced_requests: u64,
    pub local: BackendStats,
    pub cloud: BackendStats,
}

#[derive(Debug, Default)]
struct AtomicStats {
    total_requests: AtomicU64,
    local_hits: AtomicU64,
    cloud_hits: AtomicU64,
    misses: AtomicU64,
    backfills: Arc<AtomicU64>,
    write_failures: AtomicU64,
    coalesced_requests: AtomicU64,
}

/// Hybrid Cache Manager - one logical cache over a local and a cloud backend
///
/// Construct it with [`HybridCacheBuilder`](crate::HybridCacheBuilder) or
/// [`HybridCacheManager::new`]. Construction does not connect: the first
/// operation (or an explicit [`initialize`](Self::initialize)) does, exactly
/// once even under concurrent callers.
pub struct HybridCacheManager {
    config: HybridCacheConfig,
    local: Arc<BackendConnection>,
    cloud: Arc<BackendConnection>,
    monitor: HealthMonitor,
    init: OnceCell<()>,
    /// Connect task shared by every caller of `initialize`
    bootstrap: parking_lot::Mutex<Option<Shared<BoxFuture<'static, ()>>>>,
    shut_down: AtomicBool,
    stats: AtomicStats,
    /// In-flight computations for stampede protection
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl HybridCacheManager {
    /// Create a manager with Redis connectors built from `config`
    ///
    /// # Errors
    ///
    /// Returns [`HybridCacheError::InvalidConfig`] if validation fails.
    pub fn new(config: HybridCacheConfig) -> Result<Self> {
        crate::HybridCacheBuilder::new().with_config(config).build()
    }

    pub(crate) fn from_parts(
        config: HybridCacheConfig,
        local: BackendConnection,
        cloud: BackendConnection,
    ) -> Self {
        let local = Arc::new(local);
        let cloud = Arc::new(cloud);
        let monitor = HealthMonitor::new(
            Arc::clone(&local),
            Arc::clone(&cloud),
            config.health_check_interval,
        );
        Self {
            config,
            local,
            cloud,
            monitor,
            init: OnceCell::new(),
            bootstrap: parking_lot::Mutex::new(None),
            shut_down: AtomicBool::new(false),
            stats: AtomicStats::default(),
            in_flight: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HybridCacheConfig {
        &self.config
    }

    /// Connect both configured backends, once
    ///
    /// Concurrent callers share the same in-flight initialization. The
    /// connects run in their own task, so a caller that is cancelled midway
    /// (e.g. by a timeout around `get`) does not restart them for the next
    /// caller. Backends that fail to connect stay unhealthy and are retried
    /// by the health monitor; that is not an error.
    ///
    /// # Errors
    ///
    /// * [`HybridCacheError::NoBackendConfigured`] - neither backend is configured
    /// * [`HybridCacheError::ShutDown`] - called after [`disconnect`](Self::disconnect)
    pub async fn initialize(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(HybridCacheError::ShutDown);
        }
        if self.is_initialized() {
            return Ok(());
        }
        if !self.local.available() && !self.cloud.available() {
            error!("Hybrid cache has no backend configured");
            return Err(HybridCacheError::NoBackendConfigured);
        }

        self.bootstrap_task().await;
        self.monitor.start();

        if self.init.set(()).is_ok() {
            let report = self.get_health();
            if report.any_available {
                info!(
                    local_healthy = report.local.healthy,
                    cloud_healthy = report.cloud.healthy,
                    "Hybrid cache initialized"
                );
            } else {
                warn!("Hybrid cache initialized with no healthy backend, waiting for health probes");
            }
        }
        Ok(())
    }

    /// The shared connect task, spawned by the first caller
    fn bootstrap_task(&self) -> Shared<BoxFuture<'static, ()>> {
        let mut slot = self.bootstrap.lock();
        if let Some(task) = slot.as_ref() {
            return task.clone();
        }

        info!(
            local = self.local.available(),
            cloud = self.cloud.available(),
            read_preference = %self.config.read_preference,
            write_both = self.config.write_both,
            "Initializing hybrid cache"
        );

        let local = Arc::clone(&self.local);
        let cloud = Arc::clone(&self.cloud);
        let handle = tokio::spawn(async move {
            tokio::join!(local.connect(), cloud.connect());
        });
        let task = async move {
            if let Err(e) = handle.await {
                error!(error = %e, "Hybrid cache connect task ended abnormally");
            }
        }
        .boxed()
        .shared();

        *slot = Some(task.clone());
        task
    }

    /// Kick off initialization in the background if a tokio runtime is running
    pub(crate) fn spawn_initialize(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime, hybrid cache will initialize on first use");
            return;
        };
        let manager = Arc::clone(self);
        runtime.spawn(async move {
            if let Err(e) = manager.initialize().await {
                error!(error = %e, "Hybrid cache background initialization failed");
            }
        });
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.init.initialized()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Get value by key
    ///
    /// Consults backends in read-preference order and returns the first hit.
    /// With `sync_on_read_miss`, a hit on the secondary backend is copied
    /// into the healthy backend that missed (fire-and-forget).
    ///
    /// # Returns
    /// * `Ok(Some(value))` - found in a healthy backend
    /// * `Ok(None)` - miss, or no backend healthy
    ///
    /// # Errors
    ///
    /// Only initialization errors ([`HybridCacheError::NoBackendConfigured`],
    /// [`HybridCacheError::ShutDown`]); backend failures read as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.initialize().await?;
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        if self.config.read_preference == ReadPreference::Both {
            return Ok(self.get_from_both(key).await);
        }

        let (primary, secondary) = self.preference_order();
        if let Some(value) = self.read_from(primary, key).await {
            self.record_hit(primary.role());
            return Ok(Some(value));
        }
        if let Some(value) = self.read_from(secondary, key).await {
            self.record_hit(secondary.role());
            self.backfill(primary, key, &value);
            return Ok(Some(value));
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss");
        Ok(None)
    }

    async fn get_from_both(&self, key: &str) -> Option<String> {
        let (local, cloud) = tokio::join!(
            self.read_from(&self.local, key),
            self.read_from(&self.cloud, key)
        );
        match (local, cloud) {
            (Some(value), cloud) => {
                self.record_hit(Role::Local);
                if cloud.is_none() {
                    self.backfill(&self.cloud, key, &value);
                }
                Some(value)
            }
            (None, Some(value)) => {
                self.record_hit(Role::Cloud);
                self.backfill(&self.local, key, &value);
                Some(value)
            }
            (None, None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Read from one backend if healthy; errors read as a miss
    async fn read_from(&self, conn: &BackendConnection, key: &str) -> Option<String> {
        let handle = conn.handle()?;
        match handle.get(key).await {
            Ok(value) => value,
            Err(e) => {
                conn.record_operation_failure();
                warn!(role = %conn.role(), key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    fn record_hit(&self, role: Role) {
        let counter = match role {
            Role::Local => &self.stats.local_hits,
            Role::Cloud => &self.stats.cloud_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Best-effort copy of `value` into `target`; never blocks the read
    fn backfill(&self, target: &BackendConnection, key: &str, value: &str) {
        if !self.config.sync_on_read_miss {
            return;
        }
        let Some(handle) = target.handle() else {
            return;
        };
        let key = key.to_string();
        let value = value.to_string();
        let ttl = self.config.backfill_ttl;
        let backfills = Arc::clone(&self.stats.backfills);

        tokio::spawn(async move {
            match handle.set(&key, &value, ttl).await {
                Ok(()) => {
                    backfills.fetch_add(1, Ordering::Relaxed);
                    debug!(role = %handle.role(), key = %key, "Backfilled key after read miss");
                }
                Err(e) => {
                    debug!(role = %handle.role(), key = %key, error = %e, "Backfill failed, ignoring");
                }
            }
        });
    }

    /// Store a value on every healthy backend (or the preferred one when
    /// `write_both` is off), optionally with a TTL
    ///
    /// Writes run concurrently; one backend failing does not affect the other.
    ///
    /// # Errors
    ///
    /// * [`HybridCacheError::NoBackendAvailable`] - no backend is healthy, or
    ///   every issued write failed
    /// * [`HybridCacheError::InvalidTtl`] - `ttl` is shorter than one second
    /// * initialization errors
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        if ttl.is_some_and(|ttl| ttl.as_secs() == 0) {
            return Err(HybridCacheError::InvalidTtl);
        }
        self.initialize().await?;

        let targets = self.write_targets();
        if targets.is_empty() {
            error!(key = %key, "Cache set failed: no healthy backend");
            return Err(HybridCacheError::unavailable("set"));
        }

        let outcome = join_best_effort(
            targets
                .iter()
                .map(|handle| (handle.role(), handle.set(key, value, ttl)))
                .collect(),
        )
        .await;

        for (role, e) in &outcome.failed {
            self.note_write_failure(*role, key, "set", e);
        }
        if !outcome.any_succeeded() {
            error!(key = %key, "Cache set failed on every healthy backend");
            return Err(HybridCacheError::unavailable("set"));
        }

        debug!(key = %key, backends = ?outcome.succeeded, ttl_secs = ?ttl.map(|t| t.as_secs()), "Cached key");
        Ok(())
    }

    /// Delete a key with the same fan-out as [`set`](Self::set)
    ///
    /// Best-effort: backend failures are logged, never returned.
    ///
    /// # Errors
    ///
    /// Only initialization errors.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.initialize().await?;

        let targets = self.write_targets();
        if targets.is_empty() {
            warn!(key = %key, "Cache delete skipped: no healthy backend");
            return Ok(());
        }

        let outcome = join_best_effort(
            targets
                .iter()
                .map(|handle| (handle.role(), handle.delete(key)))
                .collect(),
        )
        .await;

        for (role, e) in &outcome.failed {
            self.note_write_failure(*role, key, "delete", e);
        }
        debug!(key = %key, backends = ?outcome.succeeded, "Deleted key");
        Ok(())
    }

    /// Whether any healthy backend holds the key, checked in preference order
    ///
    /// # Errors
    ///
    /// Only initialization errors; backend failures read as `false`.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.initialize().await?;

        let (primary, secondary) = self.preference_order();
        for conn in [primary, secondary] {
            let Some(handle) = conn.handle() else {
                continue;
            };
            match handle.exists(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    conn.record_operation_failure();
                    warn!(role = %conn.role(), key = %key, error = %e, "Cache exists check failed");
                }
            }
        }
        Ok(false)
    }

    /// Direct handle to the local backend if healthy, else the cloud one
    ///
    /// Independent of `read_preference`.
    ///
    /// # Errors
    ///
    /// * [`HybridCacheError::NoBackendAvailable`] - no backend is healthy
    /// * initialization errors
    pub async fn get_client(&self) -> Result<BackendHandle> {
        self.initialize().await?;
        self.local
            .handle()
            .or_else(|| self.cloud.handle())
            .ok_or_else(|| HybridCacheError::unavailable("get_client"))
    }

    /// Handles for each backend that is currently healthy
    ///
    /// # Errors
    ///
    /// Only initialization errors.
    pub async fn get_clients(&self) -> Result<BackendClients> {
        self.initialize().await?;
        Ok(BackendClients {
            local: self.local.handle(),
            cloud: self.cloud.handle(),
        })
    }

    /// Current health flags, as of the last connect or probe
    ///
    /// Pure read: no probing, no initialization.
    #[must_use]
    pub fn get_health(&self) -> HealthReport {
        HealthReport::from_connections(&self.local, &self.cloud)
    }

    /// Probe both backends now and return the fresh report
    ///
    /// # Errors
    ///
    /// Only initialization errors.
    pub async fn check_health(&self) -> Result<HealthReport> {
        self.initialize().await?;
        Ok(HealthMonitor::tick(&self.local, &self.cloud).await)
    }

    /// Typed get: deserialize the stored JSON into `T`
    ///
    /// # Errors
    ///
    /// [`HybridCacheError::Serialization`] if the stored value is not valid
    /// JSON for `T`, plus the errors of [`get`](Self::get).
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Typed set: serialize `value` as JSON
    ///
    /// # Errors
    ///
    /// [`HybridCacheError::Serialization`] plus the errors of [`set`](Self::set).
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }

    /// Get a value, computing and caching it on miss
    ///
    /// Concurrent misses on the same key are coalesced: only one caller runs
    /// `compute_fn`, the others wait and then read its result. Failing to
    /// cache the computed value is logged, not returned.
    ///
    /// # Errors
    ///
    /// [`HybridCacheError::Compute`] if `compute_fn` fails, plus initialization errors.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute_fn: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let lock = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let waited = lock.try_lock().is_err();
        let _guard = lock.lock().await;
        let _cleanup_guard = CleanupGuard {
            map: &self.in_flight,
            key: key.to_string(),
        };

        if waited {
            self.stats.coalesced_requests.fetch_add(1, Ordering::Relaxed);
            // Another caller may have just populated it
            if let Some(value) = self.get(key).await? {
                return Ok(value);
            }
        }

        debug!(key = %key, "Computing value on miss");
        let value = compute_fn().await.map_err(HybridCacheError::Compute)?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!(key = %key, error = %e, "Failed to cache computed value");
        }
        Ok(value)
    }

    /// Statistics snapshot
    #[must_use]
    pub fn get_stats(&self) -> HybridCacheStats {
        let total_requests = self.stats.total_requests.load(Ordering::Relaxed);
        let local_hits = self.stats.local_hits.load(Ordering::Relaxed);
        let cloud_hits = self.stats.cloud_hits.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total_requests > 0 {
            ((local_hits + cloud_hits) as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        HybridCacheStats {
            total_requests,
            local_hits,
            cloud_hits,
            misses: self.stats.misses.load(Ordering::Relaxed),
            hit_rate,
            backfills: self.stats.backfills.load(Ordering::Relaxed),
            write_failures: self.stats.write_failures.load(Ordering::Relaxed),
            coalesced_requests: self.stats.coalesced_requests.load(Ordering::Relaxed),
            local: self.local.stats(),
            cloud: self.cloud.stats(),
        }
    }

    /// Stop the health monitor and close both connections
    ///
    /// Close failures are logged and swallowed. Afterwards every operation
    /// returns [`HybridCacheError::ShutDown`]. Idempotent.
    pub async fn disconnect(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disconnecting hybrid cache");
        self.monitor.stop().await;
        tokio::join!(self.local.close(), self.cloud.close());
        info!("Hybrid cache disconnected");
    }

    /// (primary, secondary) in read/write preference order
    fn preference_order(&self) -> (&BackendConnection, &BackendConnection) {
        match self.config.read_preference {
            ReadPreference::Cloud => (self.cloud.as_ref(), self.local.as_ref()),
            ReadPreference::Local | ReadPreference::Both => (self.local.as_ref(), self.cloud.as_ref()),
        }
    }

    /// Healthy handles a write should go to
    ///
    /// With `write_both` off, only the first healthy backend in preference
    /// order; if the preferred one is down this falls back to the other.
    fn write_targets(&self) -> Vec<BackendHandle> {
        let (primary, secondary) = self.preference_order();
        let healthy = [primary.handle(), secondary.handle()].into_iter().flatten();
        if self.config.write_both {
            healthy.collect()
        } else {
            healthy.take(1).collect()
        }
    }

    fn note_write_failure(&self, role: Role, key: &str, operation: &str, e: &anyhow::Error) {
        self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
        let conn = match role {
            Role::Local => &self.local,
            Role::Cloud => &self.cloud,
        };
        conn.record_operation_failure();
        warn!(role = %role, key = %key, operation, error = %e, "Cache write failed on one backend");
    }
}

impl std::fmt::Debug for HybridCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridCacheManager")
            .field("local", &self.local)
            .field("cloud", &self.cloud)
            .field("initialized", &self.is_initialized())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
