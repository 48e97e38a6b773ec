//! DNS resolver module
//!
//! ```text
//!  Resolver::resolve
//!        |
//!   DnsCache -- fresh --> return
//!        | miss / expired
//!   RaceEngine --> ResolverHandle x N --> Transport
//!        |                 | unreachable
//!        |            SystemResolver (once per race)
//!   DnsCache <-- store on success
//! ```

mod cache;
mod endpoint;
mod query;
mod race;
mod record;
mod resolver;
mod set;
mod system;
mod transport;

pub use cache::{CacheLookup, DnsCache};
pub use endpoint::{Endpoint, EndpointAddr, Protocol, ResolverHandle, DNS_PORT};
pub use query::Query;
pub use race::{RaceEngine, RaceMode, DEFAULT_OVERALL_TIMEOUT};
pub use record::{RecordView, ResolvedRecord};
pub use resolver::{Resolver, ResolverBuilder};
pub use set::ResolverSet;
pub use system::{GaiResolver, NotFound, SystemResolver};
pub use transport::{Answer, HickoryTransport, Transport, TransportError};
