//! Resolver endpoints and handles

use super::query::Query;
use super::transport::{Answer, Transport, TransportError};
use crate::{Error, Result};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Default DNS port
pub const DNS_PORT: u16 = 53;

/// Transport protocol used to reach an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

/// Where an endpoint lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointAddr {
    /// Explicit upstream server
    Server(SocketAddr),
    /// Nameservers from the OS resolver configuration
    PlatformDefault,
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddr::Server(addr) => write!(f, "{}", addr),
            EndpointAddr::PlatformDefault => f.write_str("platform-default"),
        }
    }
}

/// One upstream DNS server or the platform default. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: EndpointAddr,
    protocol: Protocol,
    timeout: Duration,
}

impl Endpoint {
    pub fn server(addr: SocketAddr, protocol: Protocol, timeout: Duration) -> Self {
        Endpoint {
            addr: EndpointAddr::Server(addr),
            protocol,
            timeout,
        }
    }

    pub fn platform_default(timeout: Duration) -> Self {
        Endpoint {
            addr: EndpointAddr::PlatformDefault,
            protocol: Protocol::Udp,
            timeout,
        }
    }

    /// Parse a user-supplied address.
    ///
    /// Accepted forms, each optionally prefixed with `udp://` or `tcp://`:
    /// - `8.8.8.8`, `2001:4860:4860::8888` (port 53)
    /// - `[2001:4860:4860::8888]` (port 53)
    /// - `8.8.8.8:5353`, `[2001:4860:4860::8888]:53`
    /// - `dns.example.net`, `dns.example.net:53` (looked up once, here)
    pub fn parse(input: &str, timeout: Duration) -> Result<Self> {
        let trimmed = input.trim();
        let (protocol, rest) = if let Some(rest) = trimmed.strip_prefix("udp://") {
            (Protocol::Udp, rest)
        } else if let Some(rest) = trimmed.strip_prefix("tcp://") {
            (Protocol::Tcp, rest)
        } else {
            (Protocol::Udp, trimmed)
        };

        let addr = parse_socket_addr(rest).ok_or_else(|| Error::invalid_endpoint(input))?;
        Ok(Endpoint::server(addr, protocol, timeout))
    }

    pub fn addr(&self) -> EndpointAddr {
        self.addr
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_platform_default(&self) -> bool {
        self.addr == EndpointAddr::PlatformDefault
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.addr, self.protocol) {
            (EndpointAddr::Server(_), Protocol::Tcp) => write!(f, "tcp://{}", self.addr),
            _ => write!(f, "{}", self.addr),
        }
    }
}

fn parse_socket_addr(s: &str) -> Option<SocketAddr> {
    if s.is_empty() {
        return None;
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Some(addr);
    }
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(SocketAddr::new(ip, DNS_PORT));
    }
    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let ip = inner.parse::<Ipv6Addr>().ok()?;
        return Some(SocketAddr::new(IpAddr::V6(ip), DNS_PORT));
    }

    // Hostname, with or without a port
    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok()?),
        None => (s, DNS_PORT),
    };
    if host.is_empty() || host.contains(':') || host.contains('/') {
        return None;
    }

    let mut addrs = (host, port).to_socket_addrs().ok()?.collect::<Vec<_>>();
    // Prefer IPv4, the family we resolve
    addrs.sort_by_key(|a| !a.is_ipv4());
    addrs.into_iter().next()
}

/// An endpoint bound to the transport that serves it.
#[derive(Clone)]
pub struct ResolverHandle {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
}

impl ResolverHandle {
    pub fn new(endpoint: Endpoint, transport: Arc<dyn Transport>) -> Self {
        ResolverHandle {
            endpoint,
            transport,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send once, bounded by the endpoint timeout. No retries.
    pub async fn send(&self, query: &Query) -> std::result::Result<Answer, TransportError> {
        match tokio::time::timeout(self.endpoint.timeout, self.transport.send(&self.endpoint, query)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Blocking variant of [`send`](Self::send) for synchronous callers.
    ///
    /// Drives the send on a private current-thread runtime, so it must not be
    /// called from inside an async context.
    pub fn send_blocking(&self, query: &Query) -> std::result::Result<Answer, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Other(format!("runtime: {}", e)))?;
        runtime.block_on(self.send(query))
    }
}

impl fmt::Debug for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverHandle")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_parse_ip_literals() {
        let ep = Endpoint::parse("8.8.8.8", TIMEOUT).unwrap();
        assert_eq!(ep.addr(), EndpointAddr::Server("8.8.8.8:53".parse().unwrap()));
        assert_eq!(ep.protocol(), Protocol::Udp);
        assert_eq!(ep.timeout(), TIMEOUT);

        let ep = Endpoint::parse("1.1.1.1:5353", TIMEOUT).unwrap();
        assert_eq!(ep.addr(), EndpointAddr::Server("1.1.1.1:5353".parse().unwrap()));

        let ep = Endpoint::parse("2001:4860:4860::8888", TIMEOUT).unwrap();
        assert_eq!(
            ep.addr(),
            EndpointAddr::Server("[2001:4860:4860::8888]:53".parse().unwrap())
        );

        let ep = Endpoint::parse("[::1]:5300", TIMEOUT).unwrap();
        assert_eq!(ep.addr(), EndpointAddr::Server("[::1]:5300".parse().unwrap()));
    }

    #[test]
    fn test_parse_bracketed_ipv6_without_port() {
        let ep = Endpoint::parse("[2001:4860:4860::8888]", TIMEOUT).unwrap();
        assert_eq!(
            ep.addr(),
            EndpointAddr::Server("[2001:4860:4860::8888]:53".parse().unwrap())
        );

        let ep = Endpoint::parse("tcp://[::1]", TIMEOUT).unwrap();
        assert_eq!(ep.addr(), EndpointAddr::Server("[::1]:53".parse().unwrap()));
        assert_eq!(ep.protocol(), Protocol::Tcp);

        for bad in ["[]", "[8.8.8.8]", "[::1"] {
            let err = Endpoint::parse(bad, TIMEOUT).unwrap_err();
            assert!(matches!(err, Error::InvalidEndpoint(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_protocol_prefix() {
        let ep = Endpoint::parse("tcp://9.9.9.9", TIMEOUT).unwrap();
        assert_eq!(ep.protocol(), Protocol::Tcp);
        assert_eq!(ep.to_string(), "tcp://9.9.9.9:53");

        let ep = Endpoint::parse("udp://9.9.9.9:53", TIMEOUT).unwrap();
        assert_eq!(ep.protocol(), Protocol::Udp);
        assert_eq!(ep.to_string(), "9.9.9.9:53");
    }

    #[test]
    fn test_parse_localhost_hostname() {
        let ep = Endpoint::parse("localhost:5353", TIMEOUT).unwrap();
        match ep.addr() {
            EndpointAddr::Server(addr) => {
                assert!(addr.ip().is_loopback());
                assert_eq!(addr.port(), 5353);
            }
            EndpointAddr::PlatformDefault => panic!("expected a server endpoint"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "   ", "8.8.8.8:notaport", "https://dns.google/dns-query", "1.2.3.4:99999"] {
            let err = Endpoint::parse(bad, TIMEOUT).unwrap_err();
            assert!(matches!(err, Error::InvalidEndpoint(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_platform_default_display() {
        let ep = Endpoint::platform_default(TIMEOUT);
        assert!(ep.is_platform_default());
        assert_eq!(ep.to_string(), "platform-default");
    }

    struct SlowTransport;

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _endpoint: &Endpoint, _query: &Query) -> std::result::Result<Answer, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Answer::new(vec!["10.0.0.1".into()]))
        }
    }

    struct FixedTransport(Ipv4Addr);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(&self, _endpoint: &Endpoint, _query: &Query) -> std::result::Result<Answer, TransportError> {
            Ok(Answer::new(vec![self.0.to_string()]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out() {
        let endpoint = Endpoint::parse("192.0.2.1", Duration::from_millis(200)).unwrap();
        let handle = ResolverHandle::new(endpoint, Arc::new(SlowTransport));
        let query = Query::a("example.test").unwrap();

        assert_eq!(handle.send(&query).await, Err(TransportError::Timeout));
    }

    #[test]
    fn test_send_blocking() {
        let endpoint = Endpoint::parse("192.0.2.1", TIMEOUT).unwrap();
        let handle = ResolverHandle::new(endpoint, Arc::new(FixedTransport(Ipv4Addr::new(10, 1, 2, 3))));
        let query = Query::a("example.test").unwrap();

        let answer = handle.send_blocking(&query).unwrap();
        assert_eq!(answer.first_ipv4(), Some(Ipv4Addr::new(10, 1, 2, 3)));
    }
}
