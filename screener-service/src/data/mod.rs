//! Quote data layer.
//!
//! Fetches per-symbol quotes from an upstream provider, keeps them in a
//! time-bounded cache and fans requests out over a bounded worker pool.
//!
//! # Components
//! - **provider**: `QuoteFetcher` trait and `ProviderError`
//! - **yahoo**: quote-summary HTTP adapter
//! - **clock**: injectable time source
//! - **cache**: `QuoteCache` with single-flight refresh and stale fallback
//! - **batch**: `BatchProcessor` (semaphore + `JoinSet`)
//! - **watchlist**: CSV reference data with its own freshness window

mod batch;
mod cache;
mod clock;
mod provider;
pub mod watchlist;
mod yahoo;

pub use batch::{BatchFailure, BatchProcessor, BatchReport};
pub use cache::{CacheLookup, CacheStats, Freshness, QuoteCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use provider::{ProviderError, QuoteFetcher};
pub use watchlist::{WatchlistEntry, WatchlistStore};
pub use yahoo::YahooQuoteAdapter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// A normalized quote snapshot for one symbol.
///
/// Records are immutable once built; the cache swaps whole `Arc<QuoteRecord>`
/// values instead of mutating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Exchange-qualified symbol, e.g. "TCS.NS"
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Last traded price
    pub price: f64,
    /// Market capitalization in Crore
    pub market_cap: f64,
    /// Price to earnings
    pub pe_ratio: f64,
    /// Return on equity (%)
    pub roe: f64,
    /// Debt to equity ratio
    pub debt_to_equity: f64,
    pub current_ratio: f64,
    pub sector: String,
    pub industry: String,
    pub volume: u64,
    /// Absolute change since previous close
    pub change: f64,
    pub change_percent: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    /// Optional fundamentals used by the richer criteria
    #[serde(flatten)]
    pub fundamentals: Fundamentals,
    /// When the snapshot was taken
    pub fetched_at: DateTime<Utc>,
}

/// Fundamentals that not every source reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roe_growth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opm_growth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pat_growth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_growth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pledged_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoter_holding_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_roe_5y: Option<f64>,
    /// Foreign institutional holding (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fii_holding: Option<f64>,
    /// Domestic institutional holding (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dii_holding: Option<f64>,
}

impl QuoteRecord {
    /// Create a bare record with only a symbol, name and price.
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            price,
            market_cap: 0.0,
            pe_ratio: 0.0,
            roe: 0.0,
            debt_to_equity: 0.0,
            current_ratio: 0.0,
            sector: String::new(),
            industry: String::new(),
            volume: 0,
            change: 0.0,
            change_percent: 0.0,
            high_52w: 0.0,
            low_52w: 0.0,
            fundamentals: Fundamentals::default(),
            fetched_at: Utc::now(),
        }
    }

    /// Exchange code without suffix ("TCS.NS" -> "TCS").
    pub fn ticker(&self) -> &str {
        self.symbol.split('.').next().unwrap_or(&self.symbol)
    }
}

/// Qualify a bare ticker with the NSE suffix; symbols with a suffix pass through.
pub fn normalize_symbol(ticker: &str) -> String {
    let ticker = ticker.trim().to_uppercase();
    if ticker.contains('.') {
        ticker
    } else {
        format!("{}.NS", ticker)
    }
}
