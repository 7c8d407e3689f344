//! Hybrid Cache Builder
//!
//! Assembles a [`HybridCacheManager`] from a configuration and, optionally,
//! custom backend connectors.
//!
//! # Example: Redis Backends From the Environment
//!
//! ```rust,no_run
//! use hybrid_cache::{HybridCacheBuilder, HybridCacheConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = HybridCacheBuilder::new()
//!         .with_config(HybridCacheConfig::from_env()?)
//!         .build()?;
//!     cache.set("greeting", "hello", None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Backend
//!
//! ```rust
//! use hybrid_cache::HybridCacheBuilder;
//! use hybrid_cache::backends::MemoryStore;
//! use std::sync::Arc;
//!
//! let local = MemoryStore::new();
//! let cache = HybridCacheBuilder::new()
//!     .with_local_connector(Arc::new(local.connector()))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::cache_manager::HybridCacheManager;
use crate::config::{BackendConfig, HybridCacheConfig};
use crate::connection::{BackendConnection, ConnectionSettings, Role};
use crate::error::Result;
use crate::traits::Connector;

/// Builder for [`HybridCacheManager`]
///
/// # Backend Selection
///
/// For each role, a connector passed with `with_local_connector` /
/// `with_cloud_connector` wins. Otherwise, if the configuration has a
/// [`BackendConfig`] for the role, a Redis connector is built from it
/// (feature `redis`). Otherwise the role is not configured.
///
/// Timeouts and retry policy for a custom connector come from the role's
/// `BackendConfig` when present, else from the defaults.
#[derive(Default)]
pub struct HybridCacheBuilder {
    config: HybridCacheConfig,
    local_connector: Option<Arc<dyn Connector>>,
    cloud_connector: Option<Arc<dyn Connector>>,
}

impl HybridCacheBuilder {
    /// Builder with default configuration and no backends
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: HybridCacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom connector for the local backend
    #[must_use]
    pub fn with_local_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.local_connector = Some(connector);
        self
    }

    /// Use a custom connector for the cloud backend
    #[must_use]
    pub fn with_cloud_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.cloud_connector = Some(connector);
        self
    }

    /// Validate the configuration and build the manager
    ///
    /// Does not connect; see [`HybridCacheManager::initialize`].
    ///
    /// # Errors
    ///
    /// Returns [`HybridCacheError::InvalidConfig`](crate::HybridCacheError::InvalidConfig)
    /// if validation fails, or if a backend is configured by address while
    /// the `redis` feature is disabled.
    pub fn build(self) -> Result<HybridCacheManager> {
        self.config.validate()?;

        let local = connection(Role::Local, self.local_connector, self.config.local.as_ref())?;
        let cloud = connection(Role::Cloud, self.cloud_connector, self.config.cloud.as_ref())?;

        Ok(HybridCacheManager::from_parts(self.config, local, cloud))
    }
}

fn connection(
    role: Role,
    connector: Option<Arc<dyn Connector>>,
    config: Option<&BackendConfig>,
) -> Result<BackendConnection> {
    let settings = config.map(ConnectionSettings::from).unwrap_or_default();
    let connector = match (connector, config) {
        (Some(connector), _) => Some(connector),
        (None, Some(config)) => Some(default_connector(config)?),
        (None, None) => None,
    };

    Ok(match connector {
        Some(connector) => {
            debug!(role = %role, target = %connector.describe(), "Configured cache backend");
            BackendConnection::new(role, connector, settings)
        }
        None => {
            debug!(role = %role, "Cache backend not configured");
            BackendConnection::unconfigured(role)
        }
    })
}

#[cfg(feature = "redis")]
#[allow(clippy::unnecessary_wraps)]
fn default_connector(config: &BackendConfig) -> Result<Arc<dyn Connector>> {
    Ok(Arc::new(crate::backends::RedisConnector::new(config.clone())))
}

#[cfg(not(feature = "redis"))]
fn default_connector(config: &BackendConfig) -> Result<Arc<dyn Connector>> {
    Err(crate::HybridCacheError::InvalidConfig(format!(
        "backend {} needs the `redis` feature or a custom connector",
        config.address()
    )))
}
