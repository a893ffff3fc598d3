//! Process-lifetime cache of address record sets.
//!
//! Thread-safe implementation using DashMap for concurrent access. One
//! instance is normally shared (`Arc<ResolutionCache>`) by every resolver
//! that should see the same answers. Entries are never persisted.

use super::resolve::AddressRecord;
use super::transport::RecordType;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default lifetime of a non-empty record set.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default lifetime of an authoritative empty answer.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Cache key: lowercased hostname plus record type.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    name: String,
    record_type: RecordType,
}

impl CacheKey {
    pub fn new(name: &str, record_type: RecordType) -> Self {
        let name = name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase();
        Self { name, record_type }
    }
}

/// Cached record set.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Records in original answer order; empty for a negative answer.
    pub records: Arc<[AddressRecord]>,
    /// When this entry was cached
    pub cached_at: Instant,
    /// How long the entry stays fresh
    pub ttl: Duration,
}

impl CacheEntry {
    /// Check if the entry is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// In-memory cache of resolved record sets.
pub struct ResolutionCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    negative_ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionCache {
    /// Create a new cache with default lifetimes and limits.
    pub fn new() -> Self {
        Self::with_ttls(DEFAULT_TTL, DEFAULT_NEGATIVE_TTL)
    }

    /// Create a cache with custom positive and negative lifetimes.
    pub fn with_ttls(ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            negative_ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a new shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Look up a fresh record set.
    pub fn get(&self, name: &str, record_type: RecordType) -> Option<Arc<[AddressRecord]>> {
        let key = CacheKey::new(name, record_type);

        let hit = self.entries.get(&key).and_then(|entry| {
            if entry.is_fresh() {
                Some(Arc::clone(&entry.records))
            } else {
                None
            }
        });

        match hit {
            Some(records) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(domain = %name, ?record_type, "cache hit");
                Some(records)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.entries.remove_if(&key, |_, entry| !entry.is_fresh());
                None
            }
        }
    }

    /// Store a record set. An empty set is kept for the negative lifetime.
    pub fn insert(&self, name: &str, record_type: RecordType, records: Vec<AddressRecord>) {
        let ttl = if records.is_empty() {
            self.negative_ttl
        } else {
            self.ttl
        };
        if ttl.is_zero() {
            return;
        }

        if self.entries.len() >= self.max_entries {
            self.evict_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        self.entries.insert(
            CacheKey::new(name, record_type),
            CacheEntry {
                records: records.into(),
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn evict_expired(&self) {
        self.entries.retain(|_, entry| entry.is_fresh());
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().cached_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("negative_ttl", &self.negative_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn a(last: u8) -> AddressRecord {
        AddressRecord::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_and_get() {
        let cache = ResolutionCache::new();
        cache.insert("Example.Test.", RecordType::A, vec![a(1), a(2)]);

        let records = cache.get("example.test", RecordType::A).unwrap();
        assert_eq!(&*records, &[a(1), a(2)]);
        assert!(cache.get("example.test", RecordType::Aaaa).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = ResolutionCache::with_ttls(Duration::from_secs(10), Duration::from_secs(2));
        cache.insert("pos.test", RecordType::A, vec![a(1)]);
        cache.insert("neg.test", RecordType::A, vec![]);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(cache.get("pos.test", RecordType::A).is_some());
        assert!(cache.get("neg.test", RecordType::A).is_none());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.get("pos.test", RecordType::A).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_entry_is_a_hit() {
        let cache = ResolutionCache::new();
        cache.insert("nodata.test", RecordType::Aaaa, vec![]);

        let records = cache.get("nodata.test", RecordType::Aaaa).unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_handle_sees_inserts() {
        let cache = ResolutionCache::shared();
        let other = Arc::clone(&cache);
        cache.insert("shared.test", RecordType::A, vec![a(9)]);
        assert!(other.get("shared.test", RecordType::A).is_some());
    }
}
