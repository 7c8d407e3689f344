//! Process-wide hybrid cache instance
//!
//! Nothing is created at load time. The first call to [`instance`] (or
//! [`init`]/[`init_with`]) builds the manager and starts its initialization
//! in the background; [`shutdown`] tears it down.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), hybrid_cache::HybridCacheError> {
//! let cache = hybrid_cache::global::instance()?;
//! cache.set("session:42", "{}", None).await?;
//! hybrid_cache::global::shutdown().await;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::builder::HybridCacheBuilder;
use crate::cache_manager::HybridCacheManager;
use crate::config::HybridCacheConfig;
use crate::error::Result;

static INSTANCE: Mutex<Option<Arc<HybridCacheManager>>> = parking_lot::const_mutex(None);

/// Shared instance, created from the environment on first use
///
/// # Errors
///
/// Returns [`HybridCacheError::InvalidConfig`](crate::HybridCacheError::InvalidConfig)
/// if the environment cannot be parsed on first use.
pub fn instance() -> Result<Arc<HybridCacheManager>> {
    get_or_create(|| HybridCacheBuilder::new().with_config(HybridCacheConfig::from_env()?).build())
}

/// Shared instance, created from `config` if it does not exist yet
///
/// # Errors
///
/// Returns [`HybridCacheError::InvalidConfig`](crate::HybridCacheError::InvalidConfig)
/// if `config` is rejected.
pub fn init(config: HybridCacheConfig) -> Result<Arc<HybridCacheManager>> {
    init_with(HybridCacheBuilder::new().with_config(config))
}

/// Shared instance, created from `builder` if it does not exist yet
///
/// # Errors
///
/// Returns the builder's error if construction fails.
pub fn init_with(builder: HybridCacheBuilder) -> Result<Arc<HybridCacheManager>> {
    let mut created = false;
    let manager = get_or_create(|| {
        created = true;
        builder.build()
    })?;
    if !created {
        warn!("Hybrid cache instance already exists, ignoring new configuration");
    }
    Ok(manager)
}

fn get_or_create<F>(create: F) -> Result<Arc<HybridCacheManager>>
where
    F: FnOnce() -> Result<HybridCacheManager>,
{
    let mut slot = INSTANCE.lock();
    if let Some(manager) = slot.as_ref() {
        return Ok(Arc::clone(manager));
    }
    let manager = Arc::new(create()?);
    manager.spawn_initialize();
    *slot = Some(Arc::clone(&manager));
    info!("Hybrid cache instance created");
    Ok(manager)
}

/// Disconnect and drop the shared instance, if any
///
/// A later [`instance`] call creates a fresh manager.
pub async fn shutdown() {
    let manager = INSTANCE.lock().take();
    if let Some(manager) = manager {
        manager.disconnect().await;
    }
}

/// Whether a shared instance currently exists
#[must_use]
pub fn is_created() -> bool {
    INSTANCE.lock().is_some()
}
