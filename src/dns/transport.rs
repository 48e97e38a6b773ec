//! DNS transport
//!
//! The race engine only needs "send this question to that endpoint". The
//! [`Transport`] trait is that seam; [`HickoryTransport`] is the real UDP/TCP
//! client and tests plug in scripted doubles.
//!
//! UDP servers are queried over a socket connected to the server, so an ICMP
//! port or host unreachable surfaces as an error on `recv` instead of a
//! silent timeout. TCP servers and the platform default go through
//! hickory-resolver.

use super::endpoint::{Endpoint, EndpointAddr, Protocol};
use super::query::Query;
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use hickory_proto::error::{ProtoError, ProtoErrorKind};
use hickory_proto::op::{Message, MessageType, OpCode, Query as Question, ResponseCode};
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

/// Receive buffer for UDP responses
const MAX_UDP_RESPONSE: usize = 4096;

/// Per-endpoint transport failure. Never surfaced to resolver callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("{0}")]
    Other(String),
}

/// Answer section of a response, as presentation-format strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Answer {
    records: Vec<String>,
}

impl Answer {
    pub fn new(records: Vec<String>) -> Self {
        Answer { records }
    }

    pub fn empty() -> Self {
        Answer::default()
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record that parses as an IPv4 address. Other record types
    /// (a CNAME ahead of the A record, say) are skipped.
    pub fn first_ipv4(&self) -> Option<Ipv4Addr> {
        self.records.iter().find_map(|r| r.trim().parse().ok())
    }
}

/// Sends one question to one endpoint.
///
/// Implementations should honour `endpoint.timeout()` themselves; the race
/// engine applies the same bound again around every call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &Endpoint, query: &Query) -> std::result::Result<Answer, TransportError>;
}

/// Transport backed by hickory.
///
/// UDP servers get a one-shot exchange on a connected socket. Everything
/// else gets its own single-server hickory client with hickory's cache
/// disabled and a single attempt, so retries and caching stay with us.
pub struct HickoryTransport {
    system_config: ResolverConfig,
    system_opts: ResolverOpts,
    clients: DashMap<Endpoint, TokioAsyncResolver>,
    next_id: AtomicU16,
}

impl HickoryTransport {
    /// Create a transport, reading the OS resolver configuration for the
    /// platform-default endpoint.
    pub fn from_system_conf() -> Result<Self> {
        let (system_config, system_opts) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|e| Error::platform_unavailable(e.to_string()))?;

        if system_config.name_servers().is_empty() {
            return Err(Error::platform_unavailable("no nameservers configured"));
        }

        Ok(Self::new(system_config, system_opts))
    }

    /// Create a transport with an explicit configuration for the
    /// platform-default endpoint.
    pub fn new(system_config: ResolverConfig, system_opts: ResolverOpts) -> Self {
        HickoryTransport {
            system_config,
            system_opts,
            clients: DashMap::new(),
            next_id: AtomicU16::new(std::process::id() as u16),
        }
    }

    fn client(&self, endpoint: &Endpoint) -> TokioAsyncResolver {
        if let Some(client) = self.clients.get(endpoint) {
            return client.value().clone();
        }
        let client = self.build_client(endpoint);
        self.clients
            .entry(endpoint.clone())
            .or_insert(client)
            .value()
            .clone()
    }

    fn build_client(&self, endpoint: &Endpoint) -> TokioAsyncResolver {
        let (config, mut opts) = match endpoint.addr() {
            EndpointAddr::Server(addr) => {
                let wanted = match endpoint.protocol() {
                    Protocol::Udp => hickory_resolver::config::Protocol::Udp,
                    Protocol::Tcp => hickory_resolver::config::Protocol::Tcp,
                };
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);

                let mut config = ResolverConfig::new();
                for ns in group.iter().filter(|ns| ns.protocol == wanted) {
                    config.add_name_server(ns.clone());
                }
                (config, ResolverOpts::default())
            }
            EndpointAddr::PlatformDefault => (self.system_config.clone(), self.system_opts.clone()),
        };

        opts.timeout = endpoint.timeout();
        opts.attempts = 1;
        opts.cache_size = 0;

        debug!(endpoint = %endpoint, "creating DNS client");
        TokioAsyncResolver::tokio(config, opts)
    }

    async fn lookup(&self, endpoint: &Endpoint, query: &Query) -> std::result::Result<Answer, TransportError> {
        let client = self.client(endpoint);
        match client.lookup(query.name().clone(), query.record_type()).await {
            Ok(lookup) => Ok(Answer::new(lookup.iter().map(|rdata| rdata.to_string()).collect())),
            Err(e) => classify(&e),
        }
    }

    async fn exchange_udp(
        &self,
        server: SocketAddr,
        query: &Query,
    ) -> std::result::Result<Message, TransportError> {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await.map_err(io_error)?;
        socket.connect(server).await.map_err(io_error)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = encode_request(id, query).map_err(|e| TransportError::Other(e.to_string()))?;
        socket.send(&request).await.map_err(io_error)?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        loop {
            let len = socket.recv(&mut buf).await.map_err(io_error)?;
            match Message::from_vec(&buf[..len]) {
                Ok(response) if response.id() == id && response.message_type() == MessageType::Response => {
                    return Ok(response);
                }
                Ok(response) => debug!(%server, id = response.id(), "ignoring unrelated datagram"),
                Err(e) => debug!(%server, error = %e, "ignoring malformed datagram"),
            }
        }
    }
}

#[async_trait]
impl Transport for HickoryTransport {
    async fn send(&self, endpoint: &Endpoint, query: &Query) -> std::result::Result<Answer, TransportError> {
        let server = match (endpoint.addr(), endpoint.protocol()) {
            (EndpointAddr::Server(server), Protocol::Udp) => server,
            _ => return self.lookup(endpoint, query).await,
        };

        let response = self.exchange_udp(server, query).await?;
        if response.truncated() {
            debug!(endpoint = %endpoint, "truncated response, retrying over TCP");
            let tcp = Endpoint::server(server, Protocol::Tcp, endpoint.timeout());
            return self.lookup(&tcp, query).await;
        }
        answer_from(&response)
    }
}

fn encode_request(id: u16, query: &Query) -> std::result::Result<Vec<u8>, ProtoError> {
    let mut request = Message::new();
    request
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Question::query(query.name().clone(), query.record_type()));
    request.to_vec()
}

/// NXDOMAIN is a valid, empty answer; other error codes fail the branch.
fn answer_from(response: &Message) -> std::result::Result<Answer, TransportError> {
    match response.response_code() {
        ResponseCode::NoError => Ok(Answer::new(
            response
                .answers()
                .iter()
                .filter_map(|record| record.data())
                .map(|rdata| rdata.to_string())
                .collect(),
        )),
        ResponseCode::NXDomain => Ok(Answer::empty()),
        code => Err(TransportError::Other(format!("server responded {}", code))),
    }
}

fn io_error(err: io::Error) -> TransportError {
    if is_unreachable(&err) {
        TransportError::Unreachable(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Map a hickory error onto the transport taxonomy. "No records" is a valid,
/// empty answer rather than a transport failure.
fn classify(err: &ResolveError) -> std::result::Result<Answer, TransportError> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => Ok(Answer::empty()),
        ResolveErrorKind::Timeout => Err(TransportError::Timeout),
        ResolveErrorKind::Io(e) if is_unreachable(e) => Err(TransportError::Unreachable(e.to_string())),
        ResolveErrorKind::Proto(proto) => match proto.kind() {
            ProtoErrorKind::Timeout => Err(TransportError::Timeout),
            ProtoErrorKind::Io(e) if is_unreachable(e) => {
                Err(TransportError::Unreachable(e.to_string()))
            }
            _ => Err(TransportError::Other(err.to_string())),
        },
        _ => Err(TransportError::Other(err.to_string())),
    }
}

/// Port, host or network unreachable.
///
/// A connected UDP socket reports an ICMP port-unreachable as
/// `ConnectionRefused`.
fn is_unreachable(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable
    ) {
        return true;
    }

    #[cfg(unix)]
    {
        if let Some(code) = err.raw_os_error() {
            return code == libc::ENETUNREACH || code == libc::EHOSTUNREACH;
        }
    }

    false
}
