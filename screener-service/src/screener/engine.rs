//! Screening orchestration.
//!
//! Ties the batch fetcher, evaluator, preset catalog and watchlist together.
//! The fallback policy is the same everywhere: a fresh or refreshed quote,
//! else a stale cached quote, else reference data from the watchlist where a
//! caller can use it, else the symbol is left out.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use screener_common::error::{Error, Result};

use crate::data::{
    normalize_symbol, BatchFailure, BatchProcessor, QuoteRecord, WatchlistEntry, WatchlistStore,
};
use crate::pagination::{paginate, sort_by_name, Named, PageRequest, PaginationMeta};

use super::criteria::CriteriaSet;
use super::evaluator::{failed_metrics, matches};
use super::fixtures::fixture_records;
use super::presets::PresetCatalog;

impl Named for QuoteRecord {
    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Named for WatchlistEntry {
    fn display_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Outcome Types
// ============================================================================

/// Where screened records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Fixtures,
}

impl DataSource {
    pub fn label(self) -> &'static str {
        match self {
            DataSource::Live => "Yahoo Finance (Real-time)",
            DataSource::Fixtures => "Fallback Data",
        }
    }
}

/// Result of screening a universe against criteria.
#[derive(Debug, Clone)]
pub struct ScreenOutcome {
    /// Matching records sorted by name
    pub records: Vec<Arc<QuoteRecord>>,
    /// Universe size
    pub total_checked: usize,
    pub failures: Vec<BatchFailure>,
    pub stale_count: usize,
    pub source: DataSource,
    pub elapsed: Duration,
}

/// Which value a watchlist row's quote is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    Stale,
    Reference,
}

/// Reference values from the watchlist export.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceValues {
    pub price: f64,
    pub pe_ratio: f64,
    pub roe: f64,
    pub debt_to_equity: f64,
}

/// A watchlist row merged with its quote.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedStock {
    pub name: String,
    pub symbol: String,
    pub ticker: String,
    pub industry: String,
    pub industry_group: String,
    pub source: QuoteSource,
    pub current_price: f64,
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub roe: f64,
    pub debt_to_equity: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    pub volume: u64,
    pub change: f64,
    pub change_percent: f64,
    pub sector: String,
    pub reference: ReferenceValues,
    pub price_diff_percent: f64,
}

impl EnrichedStock {
    fn from_quote(entry: &WatchlistEntry, quote: &QuoteRecord, source: QuoteSource) -> Self {
        Self {
            name: entry.name.clone(),
            symbol: entry.symbol.clone(),
            ticker: quote.ticker().to_string(),
            industry: entry.industry.clone(),
            industry_group: entry.industry_group.clone(),
            source,
            current_price: quote.price,
            market_cap: quote.market_cap,
            pe_ratio: quote.pe_ratio,
            roe: quote.roe,
            debt_to_equity: quote.debt_to_equity,
            high_52w: quote.high_52w,
            low_52w: quote.low_52w,
            volume: quote.volume,
            change: quote.change,
            change_percent: quote.change_percent,
            sector: quote.sector.clone(),
            reference: ReferenceValues::from(entry),
            price_diff_percent: price_diff_percent(quote.price, entry.price),
        }
    }

    /// Row built from the export alone when no quote is available.
    fn from_reference(entry: &WatchlistEntry) -> Self {
        let ticker = entry.symbol.split('.').next().unwrap_or(&entry.symbol);
        Self {
            name: entry.name.clone(),
            symbol: entry.symbol.clone(),
            ticker: ticker.to_string(),
            industry: entry.industry.clone(),
            industry_group: entry.industry_group.clone(),
            source: QuoteSource::Reference,
            current_price: entry.price,
            market_cap: 0.0,
            pe_ratio: entry.pe_ratio,
            roe: entry.roe,
            debt_to_equity: entry.debt_to_equity,
            // Band of +/-20% around the reference price.
            high_52w: entry.price * 1.2,
            low_52w: entry.price * 0.8,
            volume: 0,
            change: 0.0,
            change_percent: 0.0,
            sector: entry.industry_group.clone(),
            reference: ReferenceValues::from(entry),
            price_diff_percent: 0.0,
        }
    }
}

impl From<&WatchlistEntry> for ReferenceValues {
    fn from(entry: &WatchlistEntry) -> Self {
        Self {
            price: entry.price,
            pe_ratio: entry.pe_ratio,
            roe: entry.roe,
            debt_to_equity: entry.debt_to_equity,
        }
    }
}

fn price_diff_percent(price: f64, reference: f64) -> f64 {
    if reference > 0.0 {
        (price - reference) / reference * 100.0
    } else {
        0.0
    }
}

/// Per-request timing and source counts for the watchlist view.
#[derive(Debug, Clone, Serialize)]
pub struct Performance {
    pub processing_time: String,
    pub elapsed_ms: u64,
    pub live: usize,
    pub stale: usize,
    pub reference: usize,
    pub concurrency: usize,
    pub parallel_processing: bool,
}

/// One page of the enriched watchlist.
#[derive(Debug, Clone)]
pub struct WatchlistPage {
    pub stocks: Vec<EnrichedStock>,
    pub pagination: PaginationMeta,
    pub performance: Performance,
    pub source_path: Option<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Screening service core.
pub struct ScreenerEngine {
    batch: BatchProcessor,
    watchlist: Arc<WatchlistStore>,
    presets: PresetCatalog,
    universe: Vec<String>,
}

impl ScreenerEngine {
    pub fn new(
        batch: BatchProcessor,
        watchlist: Arc<WatchlistStore>,
        presets: PresetCatalog,
        universe: Vec<String>,
    ) -> Self {
        Self {
            batch,
            watchlist,
            presets,
            universe,
        }
    }

    pub fn presets(&self) -> &PresetCatalog {
        &self.presets
    }

    pub fn batch(&self) -> &BatchProcessor {
        &self.batch
    }

    pub fn watchlist(&self) -> &Arc<WatchlistStore> {
        &self.watchlist
    }

    /// Screen the universe (or the fixtures) against `criteria`.
    ///
    /// Fails only when every live symbol failed; partial failures are
    /// reported in the outcome.
    pub async fn screen(&self, criteria: &CriteriaSet, use_fallback: bool) -> Result<ScreenOutcome> {
        let started = Instant::now();

        if use_fallback {
            let fixtures = fixture_records();
            let total_checked = fixtures.len();
            let mut records: Vec<Arc<QuoteRecord>> = fixtures
                .into_iter()
                .filter(|r| admit(r, criteria))
                .map(Arc::new)
                .collect();
            sort_by_name(&mut records);

            return Ok(ScreenOutcome {
                records,
                total_checked,
                failures: Vec::new(),
                stale_count: 0,
                source: DataSource::Fixtures,
                elapsed: started.elapsed(),
            });
        }

        let report = self.batch.run(&self.universe).await;
        if report.all_failed() {
            warn!(
                universe = self.universe.len(),
                "Every symbol in the universe failed to load"
            );
            return Err(Error::Upstream(format!(
                "no quotes available for any of {} symbols",
                self.universe.len()
            )));
        }

        let mut records: Vec<Arc<QuoteRecord>> = report
            .records
            .into_iter()
            .filter(|r| admit(r, criteria))
            .collect();
        sort_by_name(&mut records);

        info!(
            checked = self.universe.len(),
            matched = records.len(),
            criteria = criteria.len(),
            "Screen complete"
        );

        Ok(ScreenOutcome {
            records,
            total_checked: self.universe.len(),
            failures: report.failures,
            stale_count: report.stale_symbols.len(),
            source: DataSource::Live,
            elapsed: started.elapsed(),
        })
    }

    /// Screen with a named preset. Unknown names are `NotFound`.
    pub async fn screen_preset(&self, id: &str, use_fallback: bool) -> Result<ScreenOutcome> {
        let preset = self
            .presets
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Filter \"{}\" not found", id)))?;
        self.screen(&preset.criteria, use_fallback).await
    }

    /// One page of the watchlist, sorted by name and merged with quotes.
    pub async fn your_stocks(&self, request: PageRequest) -> WatchlistPage {
        let started = Instant::now();

        let mut entries: Vec<WatchlistEntry> = self.watchlist.entries().as_ref().clone();
        sort_by_name(&mut entries);
        let page = paginate(&entries, request);

        let symbols: Vec<String> = page.items.iter().map(|e| e.symbol.clone()).collect();
        let report = self.batch.run(&symbols).await;

        let stale: HashSet<&str> = report.stale_symbols.iter().map(String::as_str).collect();
        let quotes: HashMap<&str, &Arc<QuoteRecord>> = report
            .records
            .iter()
            .map(|r| (r.symbol.as_str(), r))
            .collect();

        let stocks: Vec<EnrichedStock> = page
            .items
            .iter()
            .map(|entry| match quotes.get(entry.symbol.as_str()) {
                Some(quote) => {
                    let source = if stale.contains(entry.symbol.as_str()) {
                        QuoteSource::Stale
                    } else {
                        QuoteSource::Live
                    };
                    EnrichedStock::from_quote(entry, quote, source)
                }
                None => EnrichedStock::from_reference(entry),
            })
            .collect();

        let count = |s: QuoteSource| stocks.iter().filter(|st| st.source == s).count();
        let elapsed = started.elapsed();
        let performance = Performance {
            processing_time: format!("{:.2}s", elapsed.as_secs_f64()),
            elapsed_ms: elapsed.as_millis() as u64,
            live: count(QuoteSource::Live),
            stale: count(QuoteSource::Stale),
            reference: count(QuoteSource::Reference),
            concurrency: self.batch.concurrency(),
            parallel_processing: true,
        };

        WatchlistPage {
            pagination: PaginationMeta::from(&page),
            stocks,
            performance,
            source_path: self.watchlist.source().map(|p| p.display().to_string()),
        }
    }

    /// Single quote for a ticker; `.NS` is assumed without a suffix.
    pub async fn stock(&self, ticker: &str) -> Result<Arc<QuoteRecord>> {
        let symbol = normalize_symbol(ticker);
        self.batch
            .cache()
            .get_or_stale(&symbol)
            .await
            .map(|lookup| lookup.record)
            .map_err(|e| Error::NotFound(format!("Stock data not found for {}: {}", ticker, e)))
    }

    /// Warm the cache for the first `count` watchlist symbols in the background.
    ///
    /// Returns the number of symbols scheduled.
    pub fn preload(&self, count: usize) -> usize {
        let mut entries: Vec<WatchlistEntry> = self.watchlist.entries().as_ref().clone();
        sort_by_name(&mut entries);
        let symbols: Vec<String> = entries.into_iter().take(count).map(|e| e.symbol).collect();
        let scheduled = symbols.len();

        let batch = self.batch.clone();
        tokio::spawn(async move {
            let pruned = batch.cache().clear_expired();
            let report = batch.run(&symbols).await;
            info!(
                pruned,
                warmed = report.records.len(),
                failed = report.failures.len(),
                "Cache preload finished"
            );
        });

        scheduled
    }
}

/// Evaluate a record, logging which metrics rejected it.
fn admit(record: &QuoteRecord, criteria: &CriteriaSet) -> bool {
    if matches(record, criteria) {
        return true;
    }
    debug!(
        symbol = %record.symbol,
        failed = ?failed_metrics(record, criteria),
        "Record rejected"
    );
    false
}
