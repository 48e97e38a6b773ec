//! Query race engine
//!
//! Sends one A question to every endpoint of a [`ResolverSet`] and keeps the
//! first usable answer. Two shapes are supported:
//!
//! - [`RaceMode::Concurrent`]: every endpoint is queried at once on its own
//!   task; the first success by completion order wins and the remaining
//!   tasks are aborted.
//! - [`RaceMode::Sequential`]: endpoints are tried in list order, stopping
//!   at the first success.
//!
//! An endpoint that reports [`TransportError::Unreachable`] falls back to the
//! platform resolver. That lookup runs at most once per race; concurrent
//! unreachable branches share its result. Every other failure (timeout,
//! empty answer, unparseable address) just loses that branch.
//!
//! The whole race is bounded by an overall timeout. Failure of every branch
//! or the overall timeout yields [`ResolvedRecord::FAILED`].

use super::endpoint::ResolverHandle;
use super::query::Query;
use super::record::ResolvedRecord;
use super::set::ResolverSet;
use super::system::SystemResolver;
use super::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default bound on a whole race
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Clamp for TTLs too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn expiry_from_now(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

/// How endpoints are queried
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaceMode {
    #[default]
    Concurrent,
    Sequential,
}

/// Platform fallback shared by all branches of one race
struct PlatformFallback {
    hostname: String,
    system: Arc<dyn SystemResolver>,
    result: OnceCell<Option<Ipv4Addr>>,
}

impl PlatformFallback {
    fn new(hostname: &str, system: Arc<dyn SystemResolver>) -> Self {
        PlatformFallback {
            hostname: hostname.to_string(),
            system,
            result: OnceCell::new(),
        }
    }

    async fn resolve(&self) -> Option<Ipv4Addr> {
        *self
            .result
            .get_or_init(|| async {
                debug!(hostname = %self.hostname, "falling back to platform resolver");
                match self.system.lookup_ipv4(&self.hostname).await {
                    Ok(ip) => Some(ip),
                    Err(e) => {
                        debug!(error = %e, "platform fallback failed");
                        None
                    }
                }
            })
            .await
    }
}

/// One branch of the race
async fn attempt(
    handle: ResolverHandle,
    query: Arc<Query>,
    fallback: Arc<PlatformFallback>,
) -> Option<Ipv4Addr> {
    let endpoint = handle.endpoint();

    match handle.send(&query).await {
        Ok(answer) => {
            let address = answer.first_ipv4();
            match address {
                Some(ip) => debug!(endpoint = %endpoint, hostname = %query.hostname(), %ip, "answer"),
                None => debug!(
                    endpoint = %endpoint,
                    hostname = %query.hostname(),
                    records = answer.records().len(),
                    "no usable address in answer"
                ),
            }
            address
        }
        Err(TransportError::Unreachable(reason)) => {
            debug!(endpoint = %endpoint, %reason, "endpoint unreachable");
            fallback.resolve().await
        }
        Err(e) => {
            debug!(endpoint = %endpoint, error = %e, "endpoint failed");
            None
        }
    }
}

/// Resolves hostnames against a fixed resolver set.
pub struct RaceEngine {
    set: ResolverSet,
    system: Arc<dyn SystemResolver>,
    mode: RaceMode,
    overall_timeout: Duration,
    cache_ttl: Option<Duration>,
}

impl RaceEngine {
    /// `cache_ttl` is `Some` only when caching is enabled; successful records
    /// then carry `now + ttl` as their expiry.
    pub fn new(
        set: ResolverSet,
        system: Arc<dyn SystemResolver>,
        mode: RaceMode,
        overall_timeout: Duration,
        cache_ttl: Option<Duration>,
    ) -> Self {
        RaceEngine {
            set,
            system,
            mode,
            overall_timeout,
            cache_ttl,
        }
    }

    pub fn set(&self) -> &ResolverSet {
        &self.set
    }

    pub fn mode(&self) -> RaceMode {
        self.mode
    }

    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    /// Run one race. Never errors: every network failure folds into
    /// [`ResolvedRecord::FAILED`].
    pub async fn resolve(&self, query: &Query) -> ResolvedRecord {
        let query = Arc::new(query.clone());
        let fallback = Arc::new(PlatformFallback::new(query.hostname(), self.system.clone()));

        let race = async {
            match self.mode {
                RaceMode::Concurrent => self.race_concurrent(query.clone(), fallback).await,
                RaceMode::Sequential => self.race_sequential(query.clone(), fallback).await,
            }
        };

        match tokio::time::timeout(self.overall_timeout, race).await {
            Ok(Some(address)) => {
                let expires_at = self.cache_ttl.map(expiry_from_now);
                ResolvedRecord::resolved(address, expires_at)
            }
            Ok(None) => {
                debug!(hostname = %query.hostname(), "all endpoints failed");
                ResolvedRecord::FAILED
            }
            Err(_) => {
                warn!(
                    hostname = %query.hostname(),
                    timeout_ms = self.overall_timeout.as_millis() as u64,
                    "resolution timed out"
                );
                ResolvedRecord::FAILED
            }
        }
    }

    async fn race_concurrent(
        &self,
        query: Arc<Query>,
        fallback: Arc<PlatformFallback>,
    ) -> Option<Ipv4Addr> {
        // Dropping the set (winner found, or overall timeout) aborts the rest
        let mut attempts = JoinSet::new();
        for handle in self.set.handles() {
            attempts.spawn(attempt(handle.clone(), query.clone(), fallback.clone()));
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Some(address)) => {
                    attempts.abort_all();
                    return Some(address);
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "resolver attempt panicked"),
            }
        }
        None
    }

    async fn race_sequential(
        &self,
        query: Arc<Query>,
        fallback: Arc<PlatformFallback>,
    ) -> Option<Ipv4Addr> {
        for handle in self.set.handles() {
            if let Some(address) = attempt(handle.clone(), query.clone(), fallback.clone()).await {
                return Some(address);
            }
        }
        None
    }
}
