//! Error types surfaced to callers of the hybrid cache
//!
//! Failures of a single backend never show up here: they are absorbed by
//! [`BackendConnection`](crate::connection::BackendConnection) and only become
//! visible through health flags, statistics and logs.

use thiserror::Error;

/// Errors returned by [`HybridCacheManager`](crate::HybridCacheManager) operations
#[derive(Debug, Error)]
pub enum HybridCacheError {
    /// Neither the local nor the cloud backend is configured.
    ///
    /// Raised by initialization. Not recoverable: a cache with zero backends
    /// cannot exist.
    #[error("no cache backend configured (need at least one of local or cloud)")]
    NoBackendConfigured,

    /// No backend is healthy at call time (or every issued write failed).
    ///
    /// Raised by `set` and `get_client` only. Callers may retry later.
    #[error("no cache backend available for {operation}")]
    NoBackendAvailable {
        /// Operation that could not be served
        operation: &'static str,
    },

    /// Configuration was rejected by validation
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// TTL must be at least one second (`None` means no expiry)
    #[error("cache TTL must be at least one second")]
    InvalidTtl,

    /// The manager has been disconnected; no further operations may be issued
    #[error("hybrid cache has been shut down")]
    ShutDown,

    /// Typed helper could not (de)serialize a value
    #[error("cache value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compute function passed to `get_or_compute` failed
    #[error("compute on miss failed: {0}")]
    Compute(#[source] anyhow::Error),
}

impl HybridCacheError {
    pub(crate) fn unavailable(operation: &'static str) -> Self {
        Self::NoBackendAvailable { operation }
    }

    /// Whether the caller can reasonably retry the operation later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoBackendAvailable { .. })
    }
}

/// Result alias used across the crate's public API
pub type Result<T, E = HybridCacheError> = std::result::Result<T, E>;
