//! Parallel batch processor.
//!
//! Fans a symbol list out over a bounded pool: one `JoinSet` task per symbol,
//! gated by a semaphore so at most `concurrency` fetches run at once. Each
//! task goes through the cache (so stale fallback applies) under a hard
//! per-item timeout; a timed-out item also falls back to its stale entry.
//! Failures are logged and reported, never propagated.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

use screener_common::BatchConfig;

use super::cache::{CacheLookup, Freshness, QuoteCache};
use super::provider::ProviderError;
use super::QuoteRecord;

/// A symbol that produced no record.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub symbol: String,
    pub reason: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Successful records in completion order
    pub records: Vec<Arc<QuoteRecord>>,
    /// Symbols that failed, timed out, or whose task panicked
    pub failures: Vec<BatchFailure>,
    /// Symbols served from an expired entry after a failed refresh
    pub stale_symbols: Vec<String>,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Whether every requested symbol failed.
    pub fn all_failed(&self) -> bool {
        self.records.is_empty() && !self.failures.is_empty()
    }
}

/// Bounded-concurrency quote fetcher over a shared cache.
#[derive(Clone)]
pub struct BatchProcessor {
    cache: Arc<QuoteCache>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    item_timeout: Duration,
}

impl BatchProcessor {
    pub fn new(cache: Arc<QuoteCache>, concurrency: usize, item_timeout: Duration) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            cache,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            item_timeout,
        }
    }

    pub fn from_config(cache: Arc<QuoteCache>, config: &BatchConfig) -> Self {
        Self::new(
            cache,
            config.concurrency,
            Duration::from_secs(config.item_timeout_secs),
        )
    }

    /// Pool size
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cache(&self) -> &Arc<QuoteCache> {
        &self.cache
    }

    /// Fetch all symbols, returning the successful records.
    pub async fn process(&self, symbols: &[String]) -> Vec<Arc<QuoteRecord>> {
        self.run(symbols).await.records
    }

    /// Fetch all symbols and report successes and failures.
    pub async fn run(&self, symbols: &[String]) -> BatchReport {
        let started = Instant::now();
        let mut join_set: JoinSet<(String, Result<CacheLookup, ProviderError>)> = JoinSet::new();
        // A panicked task loses its output, so keep the symbol by task id.
        let mut task_symbols: HashMap<task::Id, String> = HashMap::with_capacity(symbols.len());

        for symbol in symbols {
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&self.semaphore);
            let item_timeout = self.item_timeout;
            let task_symbol = symbol.clone();
            let symbol = symbol.clone();

            let handle = join_set.spawn(async move {
                // The deadline starts once a worker slot is held.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (symbol, Err(ProviderError::Internal("worker pool closed".into())))
                    }
                };
                let result = match tokio::time::timeout(item_timeout, cache.get_or_stale(&symbol))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        let e = ProviderError::Timeout(item_timeout);
                        cache.stale_fallback(&symbol, &e).ok_or(e)
                    }
                };
                (symbol, result)
            });
            task_symbols.insert(handle.id(), task_symbol);
        }

        let mut records = Vec::with_capacity(symbols.len());
        let mut failures = Vec::new();
        let mut stale_symbols = Vec::new();

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, (symbol, Ok(lookup)))) => {
                    if lookup.freshness == Freshness::Stale {
                        stale_symbols.push(symbol);
                    }
                    records.push(lookup.record);
                }
                Ok((_, (symbol, Err(e)))) => {
                    debug!(symbol = %symbol, error = %e, "Batch item failed");
                    failures.push(BatchFailure {
                        symbol,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let symbol = task_symbols
                        .remove(&e.id())
                        .unwrap_or_else(|| String::from("<unknown>"));
                    warn!(symbol = %symbol, error = %e, "Batch task panicked");
                    failures.push(BatchFailure {
                        symbol,
                        reason: format!("task failed: {}", e),
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            requested = symbols.len(),
            succeeded = records.len(),
            failed = failures.len(),
            stale = stale_symbols.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch fetch complete"
        );

        BatchReport {
            records,
            failures,
            stale_symbols,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::SystemClock;
    use crate::data::provider::QuoteFetcher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tracks the peak number of concurrent fetches.
    struct SlowFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl QuoteFetcher for SlowFetcher {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(QuoteRecord::new(symbol, symbol, 1.0))
        }
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let fetcher = Arc::new(SlowFetcher {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let cache = Arc::new(QuoteCache::new(
            fetcher.clone(),
            Arc::new(SystemClock),
            Duration::from_secs(300),
        ));
        let batch = BatchProcessor::new(cache, 3, Duration::from_secs(5));

        let symbols: Vec<String> = (0..12).map(|i| format!("S{}.NS", i)).collect();
        let report = batch.run(&symbols).await;

        assert_eq!(report.records.len(), 12);
        assert!(report.failures.is_empty());
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_zero_concurrency_is_raised_to_one() {
        let cache = Arc::new(QuoteCache::new(
            Arc::new(SlowFetcher {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            Arc::new(SystemClock),
            Duration::from_secs(300),
        ));
        assert_eq!(BatchProcessor::new(cache, 0, Duration::from_secs(1)).concurrency(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let cache = Arc::new(QuoteCache::new(
            Arc::new(SlowFetcher {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            Arc::new(SystemClock),
            Duration::from_secs(300),
        ));
        let report = BatchProcessor::new(cache, 5, Duration::from_secs(1)).run(&[]).await;
        assert!(report.records.is_empty());
        assert!(!report.all_failed());
    }
}
