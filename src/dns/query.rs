//! Address-record question

use crate::{Error, Result};
use hickory_proto::rr::{Name, RecordType};
use std::fmt;
use std::net::Ipv4Addr;

/// A validated A-record question for one hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    hostname: String,
    name: Name,
}

impl Query {
    /// Validate `hostname` and build the question for it.
    ///
    /// The name is made fully qualified so no search domains are appended.
    pub fn a(hostname: &str) -> Result<Self> {
        if hostname.is_empty() {
            return Err(Error::invalid_hostname("empty"));
        }

        let mut name = Name::from_utf8(hostname)
            .map_err(|e| Error::invalid_hostname(format!("{}: {}", hostname, e)))?;
        name.set_fqdn(true);

        Ok(Query {
            hostname: hostname.to_string(),
            name,
        })
    }

    /// Hostname exactly as supplied by the caller
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Fully qualified DNS name
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn record_type(&self) -> RecordType {
        RecordType::A
    }

    /// The hostname parsed as an IPv4 literal, if it is one
    pub fn literal(&self) -> Option<Ipv4Addr> {
        self.hostname.parse().ok()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} IN {}", self.name, self.record_type())
    }
}
