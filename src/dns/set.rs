//! Ordered resolver set

use super::endpoint::{Endpoint, ResolverHandle};
use super::transport::Transport;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Ordered, immutable list of resolver handles: user-supplied endpoints
/// first, platform default last.
#[derive(Clone, Debug)]
pub struct ResolverSet {
    handles: Arc<[ResolverHandle]>,
}

impl ResolverSet {
    /// Build the set from failover addresses, applying one timeout to every
    /// endpoint. Any unparseable address fails the whole build.
    pub fn build<S: AsRef<str>>(
        addresses: &[S],
        timeout: Duration,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let endpoints = Self::parse_endpoints(addresses, timeout)?;
        Ok(Self::from_endpoints(endpoints, transport))
    }

    /// Parse failover addresses and append the platform default.
    pub fn parse_endpoints<S: AsRef<str>>(addresses: &[S], timeout: Duration) -> Result<Vec<Endpoint>> {
        let mut endpoints = addresses
            .iter()
            .map(|addr| Endpoint::parse(addr.as_ref(), timeout))
            .collect::<Result<Vec<_>>>()?;
        endpoints.push(Endpoint::platform_default(timeout));
        Ok(endpoints)
    }

    /// Bind already-parsed endpoints to a transport, keeping their order.
    pub fn from_endpoints(endpoints: Vec<Endpoint>, transport: Arc<dyn Transport>) -> Self {
        let handles = endpoints
            .into_iter()
            .map(|ep| ResolverHandle::new(ep, transport.clone()))
            .collect::<Vec<_>>();
        ResolverSet {
            handles: handles.into(),
        }
    }

    pub fn handles(&self) -> &[ResolverHandle] {
        &self.handles
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.handles.iter().map(ResolverHandle::endpoint)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Never true for a built set; the platform default is always present.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
