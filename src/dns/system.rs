//! Platform resolver fallback.
//!
//! Used when an upstream server cannot be reached at all. Resolution goes
//! through the operating system's `getaddrinfo`, executed on the blocking
//! pool so it never stalls the async runtime.

use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use thiserror::Error;
use tracing::debug;

/// The platform resolver had no IPv4 address for the hostname
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{hostname}: not found by platform resolver")]
pub struct NotFound {
    pub hostname: String,
}

/// Resolves a hostname through the host operating system.
#[async_trait]
pub trait SystemResolver: Send + Sync {
    async fn lookup_ipv4(&self, hostname: &str) -> Result<Ipv4Addr, NotFound>;
}

/// `getaddrinfo` in a thread pool.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SystemResolver for GaiResolver {
    async fn lookup_ipv4(&self, hostname: &str) -> Result<Ipv4Addr, NotFound> {
        let host = hostname.to_string();
        let not_found = || NotFound {
            hostname: hostname.to_string(),
        };

        let result = tokio::task::spawn_blocking(move || {
            debug!(hostname = %host, "resolving via getaddrinfo");
            (host.as_str(), 0u16)
                .to_socket_addrs()
                .map(|iter| iter.collect::<Vec<_>>())
        })
        .await;

        let addrs: io::Result<Vec<SocketAddr>> = result.map_err(|e| {
            debug!(error = %e, "getaddrinfo task failed");
            not_found()
        })?;

        let addrs = addrs.map_err(|e| {
            debug!(hostname = %hostname, error = %e, "getaddrinfo failed");
            not_found()
        })?;

        addrs
            .into_iter()
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gai_resolver_ipv4_literal() {
        let resolver = GaiResolver::new();
        let ip = resolver.lookup_ipv4("127.0.0.1").await.unwrap();
        assert_eq!(ip, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn test_gai_resolver_localhost() {
        let resolver = GaiResolver::new();
        // localhost usually maps to 127.0.0.1, but some sandboxes only carry ::1
        if let Ok(ip) = resolver.lookup_ipv4("localhost").await {
            assert!(ip.is_loopback());
        }
    }

    #[tokio::test]
    async fn test_gai_resolver_invalid_domain() {
        let resolver = GaiResolver::new();
        let err = resolver
            .lookup_ipv4("this-domain-definitely-does-not-exist.invalid")
            .await
            .unwrap_err();
        assert_eq!(err.hostname, "this-domain-definitely-does-not-exist.invalid");
    }
}
