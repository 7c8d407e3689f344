//! Hybrid cache configuration
//!
//! Every recognized option lives in [`HybridCacheConfig`] with its default.
//! Host applications usually source it from the environment with
//! [`HybridCacheConfig::from_env`], but it can be built explicitly too.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HybridCacheError, Result};
use crate::retry::RetryPolicy;

/// Which backend(s) reads consult first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPreference {
    /// Local first, cloud on miss
    #[default]
    Local,
    /// Cloud first, local on miss
    Cloud,
    /// Both concurrently; local wins when both hit
    Both,
}

impl FromStr for ReadPreference {
    type Err = HybridCacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            "both" => Ok(Self::Both),
            other => Err(HybridCacheError::InvalidConfig(format!(
                "read preference must be local, cloud or both (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

/// Address, credentials and timeouts of one backend store
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Use transport encryption (`rediss://`)
    pub tls: bool,
    /// Timeout of a single connect attempt
    pub connect_timeout: Duration,
    /// Timeout of a liveness probe
    pub probe_timeout: Duration,
    /// Timeout of a get/set/delete/exists command
    pub command_timeout: Duration,
    pub retry: RetryPolicy,
}

impl BackendConfig {
    /// Backend at `host:port` with default timeouts and retry policy
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            tls: false,
            connect_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `host:port`, never includes credentials
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self, role: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(HybridCacheError::InvalidConfig(format!(
                "{role} backend host cannot be empty"
            )));
        }
        if self.port == 0 {
            return Err(HybridCacheError::InvalidConfig(format!(
                "{role} backend port must be greater than 0"
            )));
        }
        if self.connect_timeout.is_zero()
            || self.probe_timeout.is_zero()
            || self.command_timeout.is_zero()
        {
            return Err(HybridCacheError::InvalidConfig(format!(
                "{role} backend timeouts must be greater than 0"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(HybridCacheError::InvalidConfig(format!(
                "{role} backend retry policy needs at least one attempt"
            )));
        }
        Ok(())
    }
}

// Keeps the password out of logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("connect_timeout", &self.connect_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Complete configuration of a [`HybridCacheManager`](crate::HybridCacheManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridCacheConfig {
    /// Low-latency backend, `None` when not configured
    pub local: Option<BackendConfig>,
    /// Durable backend, `None` when not configured
    pub cloud: Option<BackendConfig>,
    /// Fan writes and deletes out to every healthy backend
    pub write_both: bool,
    pub read_preference: ReadPreference,
    /// Backfill a value into the backend that missed when the other one hit
    pub sync_on_read_miss: bool,
    /// TTL applied to backfilled values (`None` = no expiry)
    pub backfill_ttl: Option<Duration>,
    /// Period of the health monitor
    pub health_check_interval: Duration,
}

impl Default for HybridCacheConfig {
    fn default() -> Self {
        Self {
            local: None,
            cloud: None,
            write_both: true,
            read_preference: ReadPreference::Local,
            sync_on_read_miss: false,
            backfill_ttl: Some(Duration::from_secs(300)),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl HybridCacheConfig {
    /// Read configuration from process environment variables
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `LOCAL_REDIS_HOST`, `CLOUD_REDIS_HOST` | backend host; unset or empty = not configured |
    /// | `*_REDIS_PORT` | port (default 6379) |
    /// | `*_REDIS_USERNAME`, `*_REDIS_PASSWORD` | optional credentials |
    /// | `*_REDIS_TLS` | `true`/`false` |
    /// | `REDIS_WRITE_BOTH` | default `true` |
    /// | `REDIS_READ_PREFERENCE` | `local`, `cloud` or `both` |
    /// | `REDIS_SYNC_ENABLED` | default `false` |
    /// | `REDIS_HEALTH_CHECK_INTERVAL_MS` | default 30000 |
    ///
    /// # Errors
    ///
    /// Returns [`HybridCacheError::InvalidConfig`] when a variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    ///
    /// # Errors
    ///
    /// Returns [`HybridCacheError::InvalidConfig`] when a variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let health_check_interval = match get("REDIS_HEALTH_CHECK_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(parse_var("REDIS_HEALTH_CHECK_INTERVAL_MS", &raw)?),
            None => defaults.health_check_interval,
        };

        Ok(Self {
            local: backend_from_lookup("LOCAL", &get)?,
            cloud: backend_from_lookup("CLOUD", &get)?,
            write_both: get("REDIS_WRITE_BOTH")
                .map(|raw| parse_bool("REDIS_WRITE_BOTH", &raw))
                .transpose()?
                .unwrap_or(defaults.write_both),
            read_preference: get("REDIS_READ_PREFERENCE")
                .map(|raw| raw.parse::<ReadPreference>())
                .transpose()?
                .unwrap_or(defaults.read_preference),
            sync_on_read_miss: get("REDIS_SYNC_ENABLED")
                .map(|raw| parse_bool("REDIS_SYNC_ENABLED", &raw))
                .transpose()?
                .unwrap_or(defaults.sync_on_read_miss),
            backfill_ttl: defaults.backfill_ttl,
            health_check_interval,
        })
    }

    /// Whether at least one backend is configured
    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.local.is_some() || self.cloud.is_some()
    }

    /// Check option values
    ///
    /// Having zero backends is not a validation error here; it is reported as
    /// [`HybridCacheError::NoBackendConfigured`] by initialization.
    ///
    /// # Errors
    ///
    /// Returns [`HybridCacheError::InvalidConfig`] describing the first bad option.
    pub fn validate(&self) -> Result<()> {
        if let Some(local) = &self.local {
            local.validate("local")?;
        }
        if let Some(cloud) = &self.cloud {
            cloud.validate("cloud")?;
        }
        if self.health_check_interval.is_zero() {
            return Err(HybridCacheError::InvalidConfig(
                "health check interval must be greater than 0".to_string(),
            ));
        }
        if self.backfill_ttl.is_some_and(|ttl| ttl.as_secs() == 0) {
            return Err(HybridCacheError::InvalidConfig(
                "backfill TTL must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

fn backend_from_lookup<F>(prefix: &str, get: &F) -> Result<Option<BackendConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(host) = get(&format!("{prefix}_REDIS_HOST")) else {
        return Ok(None);
    };

    let port_var = format!("{prefix}_REDIS_PORT");
    let port = match get(&port_var) {
        Some(raw) => parse_var(&port_var, &raw)?,
        None => 6379,
    };

    let tls_var = format!("{prefix}_REDIS_TLS");
    let tls = get(&tls_var)
        .map(|raw| parse_bool(&tls_var, &raw))
        .transpose()?
        .unwrap_or(false);

    Ok(Some(
        BackendConfig::new(host.trim(), port)
            .with_credentials(
                get(&format!("{prefix}_REDIS_USERNAME")),
                get(&format!("{prefix}_REDIS_PASSWORD")),
            )
            .with_tls(tls),
    ))
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| HybridCacheError::InvalidConfig(format!("{name} has invalid value '{raw}'")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HybridCacheError::InvalidConfig(format!(
            "{name} must be a boolean (got '{raw}')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HybridCacheConfig::default();
        assert!(config.write_both);
        assert_eq!(config.read_preference, ReadPreference::Local);
        assert!(!config.sync_on_read_miss);
        assert_eq!(config.health_check_interval, Duration::from_secs(30));
        assert!(!config.has_backend());
    }

    #[test]
    fn test_from_lookup_local_only() {
        let config = HybridCacheConfig::from_lookup(lookup(&[
            ("LOCAL_REDIS_HOST", "127.0.0.1"),
            ("LOCAL_REDIS_PORT", "6380"),
            ("CLOUD_REDIS_HOST", "  "),
            ("REDIS_READ_PREFERENCE", "Both"),
            ("REDIS_SYNC_ENABLED", "true"),
            ("REDIS_WRITE_BOTH", "0"),
        ]))
        .unwrap();

        let local = config.local.as_ref().unwrap();
        assert_eq!(local.address(), "127.0.0.1:6380");
        assert!(config.cloud.is_none());
        assert_eq!(config.read_preference, ReadPreference::Both);
        assert!(config.sync_on_read_miss);
        assert!(!config.write_both);
    }

    #[test]
    fn test_from_lookup_cloud_credentials_and_tls() {
        let config = HybridCacheConfig::from_lookup(lookup(&[
            ("CLOUD_REDIS_HOST", "cache.example.com"),
            ("CLOUD_REDIS_USERNAME", "default"),
            ("CLOUD_REDIS_PASSWORD", "s3cret"),
            ("CLOUD_REDIS_TLS", "yes"),
            ("REDIS_HEALTH_CHECK_INTERVAL_MS", "1500"),
        ]))
        .unwrap();

        let cloud = config.cloud.as_ref().unwrap();
        assert_eq!(cloud.port, 6379);
        assert!(cloud.tls);
        assert_eq!(cloud.username.as_deref(), Some("default"));
        assert_eq!(config.health_check_interval, Duration::from_millis(1500));
        assert!(!format!("{cloud:?}").contains("s3cret"));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let bad_port = HybridCacheConfig::from_lookup(lookup(&[
            ("LOCAL_REDIS_HOST", "localhost"),
            ("LOCAL_REDIS_PORT", "not-a-port"),
        ]));
        assert!(matches!(bad_port, Err(HybridCacheError::InvalidConfig(_))));

        let bad_pref = HybridCacheConfig::from_lookup(lookup(&[("REDIS_READ_PREFERENCE", "nearest")]));
        assert!(matches!(bad_pref, Err(HybridCacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate() {
        let mut config = HybridCacheConfig {
            local: Some(BackendConfig::new("localhost", 6379)),
            ..HybridCacheConfig::default()
        };
        assert!(config.validate().is_ok());

        config.health_check_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config.health_check_interval = Duration::from_secs(1);
        config.cloud = Some(BackendConfig::new("", 6379));
        assert!(config.validate().is_err());
    }
}
