//! Resolution outcome

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use tokio::time::Instant;

/// Outcome of a resolution attempt.
///
/// A failed record never carries an address or an expiry, so the single
/// [`ResolvedRecord::FAILED`] value stands for every failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedRecord {
    Resolved {
        address: Ipv4Addr,
        /// Absolute expiry, present only when caching is enabled
        expires_at: Option<Instant>,
    },
    Failed,
}

impl ResolvedRecord {
    /// Canonical failure value
    pub const FAILED: ResolvedRecord = ResolvedRecord::Failed;

    pub fn resolved(address: Ipv4Addr, expires_at: Option<Instant>) -> Self {
        ResolvedRecord::Resolved {
            address,
            expires_at,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, ResolvedRecord::Resolved { .. })
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            ResolvedRecord::Resolved { address, .. } => Some(*address),
            ResolvedRecord::Failed => None,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        match self {
            ResolvedRecord::Resolved { expires_at, .. } => *expires_at,
            ResolvedRecord::Failed => None,
        }
    }

    /// Whether the record is stale at `now`. Records without an expiry never are.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

impl fmt::Display for ResolvedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedRecord::Resolved { address, .. } => write!(f, "{}", address),
            ResolvedRecord::Failed => f.write_str("unresolved"),
        }
    }
}

/// Wire form used by the CLI's JSON output
#[derive(Debug, Serialize)]
pub struct RecordView<'a> {
    pub hostname: &'a str,
    pub successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Addr>,
    #[serde(rename = "ttl-remaining-ms", skip_serializing_if = "Option::is_none")]
    pub ttl_remaining_ms: Option<u64>,
}

impl<'a> RecordView<'a> {
    pub fn new(hostname: &'a str, record: &ResolvedRecord, now: Instant) -> Self {
        RecordView {
            hostname,
            successful: record.is_successful(),
            address: record.address(),
            ttl_remaining_ms: record
                .expires_at()
                .map(|at| u64::try_from(at.saturating_duration_since(now).as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failed_record_has_no_payload() {
        let record = ResolvedRecord::FAILED;
        assert!(!record.is_successful());
        assert_eq!(record.address(), None);
        assert_eq!(record.expires_at(), None);
        assert_eq!(record.to_string(), "unresolved");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary() {
        let now = Instant::now();
        let record = ResolvedRecord::resolved(
            Ipv4Addr::new(93, 184, 216, 34),
            Some(now + Duration::from_secs(1)),
        );

        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + Duration::from_secs(1)));
        assert!(record.is_expired_at(now + Duration::from_secs(2)));
    }

    #[test]
    fn test_record_without_expiry_never_expires() {
        let record = ResolvedRecord::resolved(Ipv4Addr::LOCALHOST, None);
        assert!(!record.is_expired_at(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_view_json() {
        let now = Instant::now();
        let record = ResolvedRecord::resolved(
            Ipv4Addr::new(203, 0, 113, 7),
            Some(now + Duration::from_millis(1500)),
        );
        let json = serde_json::to_value(RecordView::new("example.test", &record, now)).unwrap();

        assert_eq!(json["hostname"], "example.test");
        assert_eq!(json["successful"], true);
        assert_eq!(json["address"], "203.0.113.7");
        assert_eq!(json["ttl-remaining-ms"], 1500);

        let json = serde_json::to_value(RecordView::new("x", &ResolvedRecord::FAILED, now)).unwrap();
        assert_eq!(json["successful"], false);
        assert!(json.get("address").is_none());
    }

    #[test]
    fn test_record_view_clamps_huge_ttl() {
        let now = Instant::now();
        let record = ResolvedRecord::resolved(
            Ipv4Addr::new(203, 0, 113, 7),
            Some(now + Duration::from_secs(100_000_000_000_000_000)),
        );
        let view = RecordView::new("example.test", &record, now);

        assert_eq!(view.ttl_remaining_ms, Some(u64::MAX));
    }
}
