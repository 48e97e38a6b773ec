//! DNS resolver implementation

use super::cache::{CacheLookup, DnsCache};
use super::endpoint::Endpoint;
use super::query::Query;
use super::race::{RaceEngine, RaceMode};
use super::record::ResolvedRecord;
use super::set::ResolverSet;
use super::system::{GaiResolver, SystemResolver};
use super::transport::{HickoryTransport, Transport};
use crate::config::ResolverConfig;
use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Builder for [`Resolver`]. The only place configuration is validated.
pub struct ResolverBuilder {
    config: ResolverConfig,
    transport: Option<Arc<dyn Transport>>,
    system: Option<Arc<dyn SystemResolver>>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::from_config(ResolverConfig::default())
    }

    pub fn from_config(config: ResolverConfig) -> Self {
        ResolverBuilder {
            config,
            transport: None,
            system: None,
        }
    }

    /// Upstream servers, in order, ahead of the platform default
    pub fn failover_dns<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.failover = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Per-endpoint timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = saturating_millis(timeout);
        self
    }

    /// Bound on a whole resolution
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.config.overall_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn cache(mut self, enable: bool) -> Self {
        self.config.cache = enable;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_ms = saturating_millis(ttl);
        self
    }

    pub fn refresh_on_expire(mut self, enable: bool) -> Self {
        self.config.refresh_on_expire = enable;
        self
    }

    pub fn race_mode(mut self, mode: RaceMode) -> Self {
        self.config.race_mode = mode;
        self
    }

    /// Replace the hickory transport, e.g. with a test double
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the getaddrinfo fallback
    pub fn system_resolver(mut self, system: Arc<dyn SystemResolver>) -> Self {
        self.system = Some(system);
        self
    }

    /// Validate and build.
    ///
    /// Fails with `InvalidEndpoint` for an unparseable address and with
    /// `PlatformUnavailable` when the OS resolver configuration cannot be read.
    pub fn build(self) -> Result<Resolver> {
        let config = self.config;
        config.validate()?;

        let endpoints = ResolverSet::parse_endpoints(&config.failover, config.timeout())?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HickoryTransport::from_system_conf()?),
        };
        let system = self
            .system
            .unwrap_or_else(|| Arc::new(GaiResolver::new()));

        let set = ResolverSet::from_endpoints(endpoints, transport);
        info!(
            endpoints = set.len(),
            cache = config.cache,
            refresh_on_expire = config.refresh_on_expire,
            mode = ?config.race_mode,
            "resolver built"
        );

        let cache_ttl = config.cache.then(|| config.cache_ttl());
        let engine = RaceEngine::new(
            set,
            system,
            config.race_mode,
            config.overall_timeout(),
            cache_ttl,
        );

        Ok(Resolver {
            inner: Arc::new(Inner {
                engine,
                cache: config.cache.then(DnsCache::new),
                refreshing: DashMap::new(),
                config,
            }),
        })
    }
}

/// Whole milliseconds, clamped to `u64::MAX`
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    engine: RaceEngine,
    cache: Option<DnsCache>,
    /// Hostnames with a background refresh in flight
    refreshing: DashMap<String, ()>,
    config: ResolverConfig,
}

impl Inner {
    async fn resolve_and_store(&self, query: &Query) -> ResolvedRecord {
        let record = self.engine.resolve(query).await;
        if let Some(cache) = &self.cache {
            if cache.store(query.hostname(), record) {
                debug!(hostname = %query.hostname(), address = %record, "cached");
            }
        }
        record
    }
}

/// Resilient IPv4 resolver: cache first, then a race across the resolver set.
///
/// Cheap to clone; clones share the resolver set and the cache.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Resolve `hostname` to an IPv4 address.
    ///
    /// Errors only for an invalid hostname, before any I/O. Network failures
    /// come back as [`ResolvedRecord::FAILED`].
    pub async fn resolve(&self, hostname: &str) -> Result<ResolvedRecord> {
        let query = Query::a(hostname)?;

        if let Some(ip) = query.literal() {
            return Ok(ResolvedRecord::resolved(ip, None));
        }

        if let Some(cache) = &self.inner.cache {
            match cache.lookup(hostname, Instant::now()) {
                CacheLookup::Fresh(record) => {
                    debug!(hostname = %hostname, address = %record, "DNS cache hit");
                    return Ok(record);
                }
                CacheLookup::Expired(stale) if self.inner.config.refresh_on_expire => {
                    debug!(hostname = %hostname, address = %stale, "serving stale entry");
                    self.spawn_refresh(query);
                    return Ok(stale);
                }
                CacheLookup::Expired(_) => debug!(hostname = %hostname, "cache entry expired"),
                CacheLookup::Miss => debug!(hostname = %hostname, "cache miss"),
            }
        }

        Ok(self.inner.resolve_and_store(&query).await)
    }

    /// Fire-and-forget refresh, at most one in flight per hostname
    fn spawn_refresh(&self, query: Query) {
        let hostname = query.hostname().to_string();
        if self.inner.refreshing.insert(hostname.clone(), ()).is_some() {
            debug!(hostname = %hostname, "refresh already in flight");
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let record = inner.resolve_and_store(&query).await;
            inner.refreshing.remove(&hostname);
            debug!(
                hostname = %hostname,
                successful = record.is_successful(),
                "background refresh finished"
            );
        });
    }

    /// Drop the cached entry for `hostname`
    pub fn evict(&self, hostname: &str) -> Option<ResolvedRecord> {
        self.inner.cache.as_ref().and_then(|cache| cache.evict(hostname))
    }

    /// Clear DNS cache
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear();
            info!("DNS cache cleared");
        }
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.inner.cache.as_ref().map_or(0, DnsCache::len)
    }

    /// Drop stale entries now rather than on their next lookup
    pub fn purge_expired(&self) -> usize {
        self.inner
            .cache
            .as_ref()
            .map_or(0, |cache| cache.purge_expired(Instant::now()))
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.inner.engine.set().endpoints()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }
}
