//! Integration tests for the quote cache and batch processor.
//!
//! Exercise the freshness window, stale fallback, single-flight refresh and
//! best-effort batch aggregation against mock fetchers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use screener_service::data::{
    BatchProcessor, Freshness, ManualClock, ProviderError, QuoteCache, QuoteFetcher, QuoteRecord,
};

// ============================================================================
// Mock Fetchers
// ============================================================================

/// Fetcher that fails for a fixed set of symbols and can be switched off.
struct MockFetcher {
    failing: HashSet<String>,
    offline: AtomicBool,
    hanging: AtomicBool,
    delay: Duration,
    calls: AtomicU32,
}

impl MockFetcher {
    fn new() -> Self {
        Self {
            failing: HashSet::new(),
            offline: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    fn failing(symbols: &[&str]) -> Self {
        Self {
            failing: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::new()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Make every later fetch stall far past any test deadline.
    fn hang(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuoteFetcher for MockFetcher {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection refused".into()));
        }
        if self.failing.contains(symbol) {
            return Err(ProviderError::DataNotAvailable(symbol.to_string()));
        }
        let price = 100.0 + self.call_count() as f64;
        Ok(QuoteRecord::new(symbol, format!("{} Ltd", symbol), price))
    }
}

/// Fetcher whose task dies for one symbol.
struct PanickingFetcher {
    poison: &'static str,
}

#[async_trait]
impl QuoteFetcher for PanickingFetcher {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, ProviderError> {
        if symbol == self.poison {
            panic!("malformed quote for {}", symbol);
        }
        Ok(QuoteRecord::new(symbol, format!("{} Ltd", symbol), 100.0))
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap()))
}

fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("SYM{}.NS", i)).collect()
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn test_second_get_within_window_does_not_fetch() {
    let fetcher = Arc::new(MockFetcher::new());
    let clock = clock();
    let cache = QuoteCache::new(fetcher.clone(), clock.clone(), Duration::from_secs(300));

    let first = cache.get("TCS.NS").await.unwrap();
    assert_eq!(fetcher.call_count(), 1);

    clock.advance(chrono::Duration::seconds(299));
    let second = cache.get("TCS.NS").await.unwrap();

    assert_eq!(fetcher.call_count(), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let fetcher = Arc::new(MockFetcher::new());
    let clock = clock();
    let cache = QuoteCache::new(fetcher.clone(), clock.clone(), Duration::from_secs(300));

    let first = cache.get("TCS.NS").await.unwrap();
    clock.advance(chrono::Duration::seconds(301));
    let second = cache.get("TCS.NS").await.unwrap();

    assert_eq!(fetcher.call_count(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_failed_refresh_falls_back_to_stale() {
    let fetcher = Arc::new(MockFetcher::new());
    let clock = clock();
    let cache = QuoteCache::new(fetcher.clone(), clock.clone(), Duration::from_secs(300));

    let original = cache.get("INFY.NS").await.unwrap();
    fetcher.go_offline();
    clock.advance(chrono::Duration::seconds(600));

    // Plain get reports the failure.
    assert!(cache.get("INFY.NS").await.is_err());

    let lookup = cache.get_or_stale("INFY.NS").await.unwrap();
    assert_eq!(lookup.freshness, Freshness::Stale);
    assert_eq!(lookup.record.price, original.price);

    let stats = cache.stats();
    assert_eq!(stats.stale_served, 1);
    assert_eq!(stats.expired_entries, 1);
}

#[tokio::test]
async fn test_failure_without_entry_is_reported() {
    let fetcher = Arc::new(MockFetcher::failing(&["GONE.NS"]));
    let cache = QuoteCache::new(fetcher, clock(), Duration::from_secs(300));

    let err = cache.get_or_stale("GONE.NS").await.unwrap_err();
    assert!(matches!(err, ProviderError::DataNotAvailable(_)));
    assert!(cache.peek("GONE.NS").is_none());
}

#[tokio::test]
async fn test_concurrent_gets_share_one_fetch() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(50)));
    let cache = Arc::new(QuoteCache::new(
        fetcher.clone(),
        clock(),
        Duration::from_secs(300),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.get("HDFCBANK.NS").await }));
    }

    let mut prices = HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        prices.insert(record.price.to_bits());
    }

    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(prices.len(), 1);
}

#[tokio::test]
async fn test_bounded_cache_evicts_oldest() {
    let fetcher = Arc::new(MockFetcher::new());
    let cache = QuoteCache::with_capacity(fetcher, clock(), Duration::from_secs(300), Some(2));

    cache.get("A.NS").await.unwrap();
    cache.get("B.NS").await.unwrap();
    cache.get("C.NS").await.unwrap();

    assert!(cache.peek("A.NS").is_none());
    assert!(cache.peek("C.NS").is_some());
    assert_eq!(cache.stats().total_entries, 2);
}

// ============================================================================
// Batch Processor
// ============================================================================

#[tokio::test]
async fn test_batch_skips_failing_symbols() {
    let all = symbols(10);
    let failing: Vec<&str> = all[..3].iter().map(String::as_str).collect();
    let fetcher = Arc::new(MockFetcher::failing(&failing));
    let cache = Arc::new(QuoteCache::new(fetcher, clock(), Duration::from_secs(300)));
    let batch = BatchProcessor::new(cache, 5, Duration::from_secs(10));

    let records = batch.process(&all).await;
    assert_eq!(records.len(), 7);

    let report = batch.run(&all).await;
    assert_eq!(report.records.len(), 7);
    assert_eq!(report.failures.len(), 3);
    assert!(!report.all_failed());
}

#[tokio::test]
async fn test_batch_item_timeout() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(500)));
    let cache = Arc::new(QuoteCache::new(fetcher, clock(), Duration::from_secs(300)));
    let batch = BatchProcessor::new(cache, 4, Duration::from_millis(50));

    let report = batch.run(&symbols(3)).await;

    assert!(report.records.is_empty());
    assert_eq!(report.failures.len(), 3);
    assert!(report.all_failed());
    assert!(report
        .failures
        .iter()
        .all(|f| f.reason == "Timed out after 50ms"));
}

#[tokio::test]
async fn test_batch_timeout_serves_stale_entry() {
    let fetcher = Arc::new(MockFetcher::new());
    let clock = clock();
    let cache = Arc::new(QuoteCache::new(
        fetcher.clone(),
        clock.clone(),
        Duration::from_secs(300),
    ));
    let batch = BatchProcessor::new(Arc::clone(&cache), 2, Duration::from_millis(100));
    let tickers = vec!["TCS.NS".to_string()];

    assert_eq!(batch.process(&tickers).await.len(), 1);

    clock.advance(chrono::Duration::seconds(600));
    fetcher.hang();

    let report = batch.run(&tickers).await;
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].symbol, "TCS.NS");
    assert_eq!(report.stale_symbols, vec!["TCS.NS".to_string()]);
    assert!(report.failures.is_empty());
    assert_eq!(cache.stats().stale_served, 1);
}

#[tokio::test]
async fn test_batch_timeout_without_entry_fails() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.hang();
    let cache = Arc::new(QuoteCache::new(fetcher, clock(), Duration::from_secs(300)));
    let batch = BatchProcessor::new(cache, 2, Duration::from_millis(100));

    let report = batch.run(&["INFY.NS".to_string()]).await;
    assert!(report.records.is_empty());
    assert!(report.stale_symbols.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "INFY.NS");
    assert_eq!(report.failures[0].reason, "Timed out after 100ms");
}

#[tokio::test]
async fn test_batch_panic_names_symbol() {
    let fetcher = Arc::new(PanickingFetcher { poison: "SYM2.NS" });
    let cache = Arc::new(QuoteCache::new(fetcher, clock(), Duration::from_secs(300)));
    let batch = BatchProcessor::new(cache, 3, Duration::from_secs(5));

    let report = batch.run(&symbols(5)).await;
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "SYM2.NS");
    assert!(report.failures[0].reason.starts_with("task failed"));
}

#[tokio::test]
async fn test_batch_reports_stale_symbols() {
    let fetcher = Arc::new(MockFetcher::new());
    let clock = clock();
    let cache = Arc::new(QuoteCache::new(
        fetcher.clone(),
        clock.clone(),
        Duration::from_secs(300),
    ));
    let batch = BatchProcessor::new(cache, 5, Duration::from_secs(10));
    let all = symbols(4);

    assert_eq!(batch.process(&all).await.len(), 4);

    fetcher.go_offline();
    clock.advance(chrono::Duration::seconds(900));

    let report = batch.run(&all).await;
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.stale_symbols.len(), 4);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_empty_batch() {
    let fetcher = Arc::new(MockFetcher::new());
    let cache = Arc::new(QuoteCache::new(fetcher.clone(), clock(), Duration::from_secs(300)));
    let batch = BatchProcessor::new(cache, 0, Duration::from_secs(1));

    let report = batch.run(&[]).await;
    assert!(report.records.is_empty());
    assert!(!report.all_failed());
    assert_eq!(batch.concurrency(), 1);
    assert_eq!(fetcher.call_count(), 0);
}
