//! Time-bounded quote cache.
//!
//! Entries are `(Arc<QuoteRecord>, stored_at)` pairs. An entry younger than
//! the freshness window is served without I/O; anything older is refreshed
//! through the injected `QuoteFetcher` first.
//!
//! Refreshes for one symbol are single-flight: a per-key async mutex
//! serializes writers and freshness is re-checked once the lock is held, so
//! concurrent callers for a cold symbol trigger one upstream request.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use super::clock::Clock;
use super::provider::{ProviderError, QuoteFetcher};
use super::QuoteRecord;

/// Cache entry with the time it was stored
#[derive(Debug, Clone)]
struct CacheEntry {
    record: Arc<QuoteRecord>,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn age(&self, now: DateTime<Utc>) -> Duration {
        // A clock that moved backwards yields age zero.
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or_default()
    }

    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Backing map: unbounded, or LRU ordered by last refresh.
enum Store {
    Unbounded(HashMap<String, CacheEntry>),
    Bounded(LruCache<String, CacheEntry>),
}

impl Store {
    fn new(max_entries: Option<usize>) -> Self {
        match max_entries.and_then(NonZeroUsize::new) {
            Some(cap) => Self::Bounded(LruCache::new(cap)),
            None => Self::Unbounded(HashMap::new()),
        }
    }

    /// Lookup without touching recency; only refreshes reorder the LRU.
    fn peek(&self, key: &str) -> Option<&CacheEntry> {
        match self {
            Self::Unbounded(map) => map.get(key),
            Self::Bounded(lru) => lru.peek(key),
        }
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        match self {
            Self::Unbounded(map) => {
                map.insert(key, entry);
            }
            Self::Bounded(lru) => {
                lru.put(key, entry);
            }
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self {
            Self::Unbounded(map) => map.remove(key).is_some(),
            Self::Bounded(lru) => lru.pop(key).is_some(),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Unbounded(map) => map.clear(),
            Self::Bounded(lru) => lru.clear(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Unbounded(map) => map.len(),
            Self::Bounded(lru) => lru.len(),
        }
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&String, &CacheEntry)> + '_> {
        match self {
            Self::Unbounded(map) => Box::new(map.iter()),
            Self::Bounded(lru) => Box::new(lru.iter()),
        }
    }

    fn retain(&mut self, keep: impl Fn(&CacheEntry) -> bool) -> usize {
        match self {
            Self::Unbounded(map) => {
                let before = map.len();
                map.retain(|_, entry| keep(entry));
                before - map.len()
            }
            Self::Bounded(lru) => {
                let doomed: Vec<String> = lru
                    .iter()
                    .filter(|(_, entry)| !keep(entry))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &doomed {
                    lru.pop(key);
                }
                doomed.len()
            }
        }
    }
}

/// Where a returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Served from a fresh entry
    Hit,
    /// Fetched from upstream for this call
    Fetched,
    /// Upstream failed; served an expired entry
    Stale,
}

/// Result of a cache lookup that may fall back to stale data.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub record: Arc<QuoteRecord>,
    pub freshness: Freshness,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
    stale_served: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub fetch_failures: u64,
    pub stale_served: u64,
    pub ttl_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

/// Time-bounded, single-flight quote cache.
pub struct QuoteCache {
    fetcher: Arc<dyn QuoteFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_entries: Option<usize>,
    entries: RwLock<Store>,
    /// Per-symbol refresh locks
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counters: Counters,
}

impl QuoteCache {
    /// Create an unbounded cache with the given freshness window.
    pub fn new(fetcher: Arc<dyn QuoteFetcher>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self::with_capacity(fetcher, clock, ttl, None)
    }

    /// Create a cache that evicts the least recently refreshed entry beyond
    /// `max_entries`.
    pub fn with_capacity(
        fetcher: Arc<dyn QuoteFetcher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        max_entries: Option<usize>,
    ) -> Self {
        Self {
            fetcher,
            clock,
            ttl,
            max_entries,
            entries: RwLock::new(Store::new(max_entries)),
            refresh_locks: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Freshness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Name of the upstream provider
    pub fn provider_name(&self) -> &'static str {
        self.fetcher.name()
    }

    /// Return a fresh record, fetching when absent or expired.
    ///
    /// A failed refresh is returned as an error even when an expired entry
    /// exists; use [`get_or_stale`](Self::get_or_stale) to fall back to it.
    pub async fn get(&self, symbol: &str) -> Result<Arc<QuoteRecord>, ProviderError> {
        self.lookup(symbol, false).await.map(|l| l.record)
    }

    /// Like [`get`](Self::get), but serve the expired entry when the refresh fails.
    pub async fn get_or_stale(&self, symbol: &str) -> Result<CacheLookup, ProviderError> {
        self.lookup(symbol, true).await
    }

    /// Current entry regardless of age, without I/O.
    pub fn peek(&self, symbol: &str) -> Option<Arc<QuoteRecord>> {
        let store = self.entries.read().ok()?;
        store.peek(symbol).map(|e| Arc::clone(&e.record))
    }

    /// Serve the current entry, whatever its age, after `error` ended a refresh.
    ///
    /// Counts towards `stale_served`. Returns `None` when nothing was cached.
    pub fn stale_fallback(&self, symbol: &str, error: &ProviderError) -> Option<CacheLookup> {
        let record = self.peek(symbol)?;
        self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
        warn!(symbol, error = %error, "Quote refresh failed, serving stale entry");
        Some(CacheLookup {
            record,
            freshness: Freshness::Stale,
        })
    }

    /// Store a record as fetched now.
    pub fn insert(&self, record: QuoteRecord) -> Arc<QuoteRecord> {
        let symbol = record.symbol.clone();
        let record = Arc::new(record);
        self.store(&symbol, Arc::clone(&record));
        record
    }

    /// Drop a single symbol. Returns whether it was cached.
    pub fn invalidate(&self, symbol: &str) -> bool {
        self.entries
            .write()
            .map(|mut store| store.remove(symbol))
            .unwrap_or(false)
    }

    /// Clear all cache
    pub fn clear(&self) {
        if let Ok(mut store) = self.entries.write() {
            store.clear();
        }
    }

    /// Clear all expired entries. Returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries
            .write()
            .map(|mut store| store.retain(|entry| entry.is_fresh(now, ttl)))
            .unwrap_or(0)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let (total, expired) = self
            .entries
            .read()
            .map(|store| {
                let expired = store
                    .entries()
                    .filter(|(_, e)| !e.is_fresh(now, self.ttl))
                    .count();
                (store.len(), expired)
            })
            .unwrap_or((0, 0));

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fetch_failures: self.counters.fetch_failures.load(Ordering::Relaxed),
            stale_served: self.counters.stale_served.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
            max_entries: self.max_entries,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn fresh_entry(&self, symbol: &str) -> Option<Arc<QuoteRecord>> {
        let now = self.clock.now();
        let store = self.entries.read().ok()?;
        store
            .peek(symbol)
            .filter(|e| e.is_fresh(now, self.ttl))
            .map(|e| Arc::clone(&e.record))
    }

    fn store(&self, symbol: &str, record: Arc<QuoteRecord>) {
        let entry = CacheEntry {
            record,
            stored_at: self.clock.now(),
        };
        if let Ok(mut store) = self.entries.write() {
            store.insert(symbol.to_string(), entry);
        }
    }

    fn refresh_lock(&self, symbol: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.refresh_locks.lock().ok()?;
        Some(Arc::clone(locks.entry(symbol.to_string()).or_default()))
    }

    fn release_refresh_lock(&self, symbol: &str) {
        if let Ok(mut locks) = self.refresh_locks.lock() {
            // Only the table holds it: nobody is waiting on this key.
            if locks.get(symbol).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(symbol);
            }
        }
    }

    async fn lookup(&self, symbol: &str, allow_stale: bool) -> Result<CacheLookup, ProviderError> {
        if let Some(record) = self.fresh_entry(symbol) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(symbol, "Quote cache hit");
            return Ok(CacheLookup {
                record,
                freshness: Freshness::Hit,
            });
        }

        let lock = self
            .refresh_lock(symbol)
            .ok_or_else(|| ProviderError::Internal("refresh lock table poisoned".into()))?;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(symbol, allow_stale).await
        };
        drop(lock);
        self.release_refresh_lock(symbol);
        result
    }

    /// Called with the symbol's refresh lock held.
    async fn refresh_locked(
        &self,
        symbol: &str,
        allow_stale: bool,
    ) -> Result<CacheLookup, ProviderError> {
        // Another caller may have refreshed while we waited.
        if let Some(record) = self.fresh_entry(symbol) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup {
                record,
                freshness: Freshness::Hit,
            });
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(symbol, provider = self.fetcher.name(), "Quote cache miss, fetching");

        match self.fetcher.fetch(symbol).await {
            Ok(record) => {
                let record = Arc::new(record);
                self.store(symbol, Arc::clone(&record));
                Ok(CacheLookup {
                    record,
                    freshness: Freshness::Fetched,
                })
            }
            Err(e) => {
                self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
                let stale = if allow_stale {
                    self.stale_fallback(symbol, &e)
                } else {
                    None
                };
                match stale {
                    Some(lookup) => Ok(lookup),
                    None => {
                        warn!(
                            symbol,
                            error = %e,
                            recoverable = e.is_recoverable(),
                            "Quote fetch failed"
                        );
                        Err(e)
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    struct CountingFetcher {
        calls: AtomicU32,
        fail: AtomicBool,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: AtomicBool::new(false),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteFetcher for CountingFetcher {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Network("connection reset".into()));
            }
            Ok(QuoteRecord::new(symbol, symbol, 100.0 + f64::from(n)))
        }
    }

    fn setup(ttl_secs: u64) -> (Arc<CountingFetcher>, Arc<ManualClock>, QuoteCache) {
        let fetcher = Arc::new(CountingFetcher::new());
        let clock = Arc::new(ManualClock::default());
        let cache = QuoteCache::new(
            fetcher.clone(),
            clock.clone(),
            Duration::from_secs(ttl_secs),
        );
        (fetcher, clock, cache)
    }

    #[tokio::test]
    async fn test_second_get_within_window_is_a_hit() {
        let (fetcher, _clock, cache) = setup(300);

        let first = cache.get("TCS.NS").await.unwrap();
        let second = cache.get("TCS.NS").await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let (fetcher, clock, cache) = setup(300);

        cache.get("TCS.NS").await.unwrap();
        clock.advance(chrono::Duration::seconds(299));
        cache.get("TCS.NS").await.unwrap();
        assert_eq!(fetcher.calls(), 1);

        clock.advance(chrono::Duration::seconds(1));
        let refreshed = cache.get("TCS.NS").await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(refreshed.price, 102.0);
    }

    #[tokio::test]
    async fn test_get_does_not_fall_back_to_stale() {
        let (fetcher, clock, cache) = setup(300);

        cache.get("INFY.NS").await.unwrap();
        clock.advance(chrono::Duration::seconds(600));
        fetcher.fail.store(true, Ordering::SeqCst);

        assert!(cache.get("INFY.NS").await.is_err());

        let lookup = cache.get_or_stale("INFY.NS").await.unwrap();
        assert_eq!(lookup.freshness, Freshness::Stale);
        assert_eq!(lookup.record.price, 101.0);

        let stats = cache.stats();
        assert_eq!(stats.fetch_failures, 2);
        assert_eq!(stats.stale_served, 1);
    }

    #[tokio::test]
    async fn test_failure_without_entry_is_error() {
        let (fetcher, _clock, cache) = setup(300);
        fetcher.fail.store(true, Ordering::SeqCst);

        let err = cache.get_or_stale("NOPE.NS").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
        assert!(cache.peek("NOPE.NS").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_cold_reads_fetch_once() {
        let (fetcher, _clock, cache) = setup(300);
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get("SBIN.NS").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(cache.refresh_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear_expired() {
        let (fetcher, clock, cache) = setup(300);

        cache.get("A.NS").await.unwrap();
        clock.advance(chrono::Duration::seconds(400));
        cache.get("B.NS").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.active_entries, 1);

        assert_eq!(cache.clear_expired(), 1);
        assert!(cache.peek("A.NS").is_none());

        assert!(cache.invalidate("B.NS"));
        assert!(!cache.invalidate("B.NS"));
        cache.get("B.NS").await.unwrap();
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_bounded_cache_evicts_least_recently_refreshed() {
        let fetcher = Arc::new(CountingFetcher::new());
        let cache = QuoteCache::with_capacity(
            fetcher.clone(),
            Arc::new(ManualClock::default()),
            Duration::from_secs(300),
            Some(2),
        );

        cache.get("A.NS").await.unwrap();
        cache.get("B.NS").await.unwrap();
        // Reads do not count as refreshes.
        cache.get("A.NS").await.unwrap();
        cache.get("C.NS").await.unwrap();

        assert!(cache.peek("A.NS").is_none());
        assert!(cache.peek("B.NS").is_some());
        assert!(cache.peek("C.NS").is_some());
        assert_eq!(cache.stats().max_entries, Some(2));
    }

    #[test]
    fn test_insert_and_clear() {
        let (_fetcher, _clock, cache) = setup(300);
        cache.insert(QuoteRecord::new("TCS.NS", "TCS", 4125.3));
        assert_eq!(cache.stats().active_entries, 1);
        cache.clear();
        assert_eq!(cache.stats().total_entries, 0);
    }
}
