//! DNS cache implementation

use super::record::ResolvedRecord;
use dashmap::DashMap;
use tokio::time::Instant;

/// Result of a cache lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLookup {
    /// No entry for the hostname
    Miss,
    /// Entry still valid
    Fresh(ResolvedRecord),
    /// Entry was stale; it has been removed and is handed back
    Expired(ResolvedRecord),
}

/// TTL cache keyed by hostname, exactly as supplied by the caller.
///
/// Only successful records carrying an expiry are stored. Per-key
/// operations are atomic; different keys never contend on a global lock.
#[derive(Debug, Default)]
pub struct DnsCache {
    entries: DashMap<String, ResolvedRecord>,
}

impl DnsCache {
    pub fn new() -> Self {
        DnsCache {
            entries: DashMap::new(),
        }
    }

    /// Look up `hostname` at `now`.
    ///
    /// A stale entry is removed in the same step, so concurrent callers see
    /// at most one `Expired` for it.
    pub fn lookup(&self, hostname: &str, now: Instant) -> CacheLookup {
        if let Some((_, stale)) = self
            .entries
            .remove_if(hostname, |_, record| record.is_expired_at(now))
        {
            return CacheLookup::Expired(stale);
        }

        match self.entries.get(hostname) {
            Some(entry) => CacheLookup::Fresh(*entry),
            None => CacheLookup::Miss,
        }
    }

    /// Store a record, replacing any previous one. Returns false (and stores
    /// nothing) for failed records or records without an expiry.
    pub fn store(&self, hostname: &str, record: ResolvedRecord) -> bool {
        if !record.is_successful() || record.expires_at().is_none() {
            return false;
        }
        self.entries.insert(hostname.to_string(), record);
        true
    }

    /// Remove entry from cache
    pub fn evict(&self, hostname: &str) -> Option<ResolvedRecord> {
        self.entries.remove(hostname).map(|(_, record)| record)
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every entry stale at `now`, returning how many went
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(ip: [u8; 4], expires_at: Instant) -> ResolvedRecord {
        ResolvedRecord::resolved(Ipv4Addr::from(ip), Some(expires_at))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_store_lookup() {
        let cache = DnsCache::new();
        let now = Instant::now();
        let rec = record([93, 184, 216, 34], now + Duration::from_secs(1));

        assert_eq!(cache.lookup("example.test", now), CacheLookup::Miss);
        assert!(cache.store("example.test", rec));
        assert_eq!(cache.lookup("example.test", now), CacheLookup::Fresh(rec));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_keys_are_case_sensitive() {
        let cache = DnsCache::new();
        let now = Instant::now();
        cache.store("Example.test", record([10, 0, 0, 1], now + Duration::from_secs(5)));

        assert_eq!(cache.lookup("example.test", now), CacheLookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry_removes_entry() {
        let cache = DnsCache::new();
        let now = Instant::now();
        let rec = record([10, 0, 0, 1], now + Duration::from_secs(1));
        cache.store("example.test", rec);

        let later = now + Duration::from_secs(1);
        assert_eq!(cache.lookup("example.test", later), CacheLookup::Expired(rec));
        assert_eq!(cache.lookup("example.test", later), CacheLookup::Miss);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_records_not_cached() {
        let cache = DnsCache::new();
        assert!(!cache.store("example.test", ResolvedRecord::FAILED));
        assert!(!cache.store("example.test", ResolvedRecord::resolved(Ipv4Addr::LOCALHOST, None)));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_replaces() {
        let cache = DnsCache::new();
        let now = Instant::now();
        cache.store("example.test", record([10, 0, 0, 1], now + Duration::from_secs(1)));
        let newer = record([10, 0, 0, 2], now + Duration::from_secs(2));
        cache.store("example.test", newer);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("example.test", now), CacheLookup::Fresh(newer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_clear_purge() {
        let cache = DnsCache::new();
        let now = Instant::now();
        cache.store("a.test", record([10, 0, 0, 1], now + Duration::from_secs(1)));
        cache.store("b.test", record([10, 0, 0, 2], now + Duration::from_secs(10)));
        cache.store("c.test", record([10, 0, 0, 3], now + Duration::from_secs(10)));

        assert!(cache.evict("c.test").is_some());
        assert!(cache.evict("c.test").is_none());

        assert_eq!(cache.purge_expired(now + Duration::from_secs(5)), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_expired_observer() {
        let cache = Arc::new(DnsCache::new());
        let now = Instant::now();
        cache.store("example.test", record([10, 0, 0, 1], now));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.lookup("example.test", now))
            })
            .collect();

        let expired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| matches!(r, CacheLookup::Expired(_)))
            .count();
        assert_eq!(expired, 1);
    }
}
