//! Robust DNS - resilient IPv4 hostname resolution
//!
//! Resolves a hostname by racing one A question across an ordered set of
//! DNS servers (user-supplied first, platform default last):
//! - Concurrent race or list-order chain
//! - Per-endpoint and overall timeouts
//! - Platform resolver fallback when a server is unreachable
//! - TTL cache with optional serve-stale background refresh
//!
//! # Example
//!
//! ```rust,no_run
//! use robust_dns::Resolver;
//! use std::time::Duration;
//!
//! # async fn run() -> robust_dns::Result<()> {
//! let resolver = Resolver::builder()
//!     .failover_dns(["8.8.8.8", "1.1.1.1"])
//!     .timeout(Duration::from_secs(2))
//!     .cache(true)
//!     .cache_ttl(Duration::from_secs(60))
//!     .refresh_on_expire(true)
//!     .build()?;
//!
//! let record = resolver.resolve("example.com").await?;
//! if let Some(ip) = record.address() {
//!     println!("example.com -> {}", ip);
//! }
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod config;
pub mod dns;

pub use common::error::{Error, Result};
pub use config::ResolverConfig;
pub use dns::{RaceMode, ResolvedRecord, Resolver, ResolverBuilder};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
