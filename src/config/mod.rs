//! Configuration module

use crate::dns::RaceMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Resolver configuration, consumed read-only once a resolver is built.
///
/// ```yaml
/// failover:
///   - 8.8.8.8
///   - tcp://1.1.1.1:53
/// timeout-ms: 2000
/// cache: true
/// cache-ttl-ms: 60000
/// refresh-on-expire: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Upstream DNS servers, tried ahead of the platform default
    pub failover: Vec<String>,

    /// Per-endpoint timeout
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Bound on a whole resolution
    #[serde(rename = "overall-timeout-ms")]
    pub overall_timeout_ms: u64,

    /// Enable the TTL cache
    pub cache: bool,

    /// Cache entry lifetime
    #[serde(rename = "cache-ttl-ms")]
    pub cache_ttl_ms: u64,

    /// Serve stale entries while refreshing in the background
    #[serde(rename = "refresh-on-expire")]
    pub refresh_on_expire: bool,

    /// Concurrent race or list-order chain
    #[serde(rename = "race-mode")]
    pub race_mode: RaceMode,
}

impl ResolverConfig {
    /// Load configuration from file (synchronous)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from file (async)
    pub async fn load_async<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    /// Load from string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: ResolverConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// Endpoint addresses are checked when the resolver set is built.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout-ms must be greater than 0"));
        }
        if self.overall_timeout_ms == 0 {
            return Err(Error::config("overall-timeout-ms must be greater than 0"));
        }
        if self.cache && self.cache_ttl_ms == 0 {
            return Err(Error::config("cache-ttl-ms must be greater than 0 when cache is enabled"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            failover: Vec::new(),
            timeout_ms: 5_000,
            overall_timeout_ms: 10_000,
            cache: false,
            cache_ttl_ms: 300_000,
            refresh_on_expire: false,
            race_mode: RaceMode::Concurrent,
        }
    }
}
