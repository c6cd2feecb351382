//! Yahoo Finance quote-summary adapter.
//!
//! # Endpoint
//! `GET {base}/v10/finance/quoteSummary/{symbol}?modules=...`
//!
//! The response carries one object per requested module. Numeric fields are
//! usually `{ "raw": 123.4, "fmt": "123.40" }`; the adapter flattens every
//! module into one key space and keeps the raw value.
//!
//! # Units
//! - `marketCap` arrives in rupees and is reported in Crore (÷ 10^7)
//! - `returnOnEquity`, `earningsGrowth`, `revenueGrowth`, `profitMargins` and
//!   `heldPercentInstitutions` are fractions and become percentages
//! - `debtToEquity` arrives as a percentage and becomes a ratio

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use screener_common::QuotesConfig;

use super::provider::{ProviderError, QuoteFetcher};
use super::{Fundamentals, QuoteRecord};

// ============================================================================
// Constants
// ============================================================================

/// Quote-summary endpoint prefix
const QUOTE_SUMMARY_ENDPOINT: &str = "/v10/finance/quoteSummary";

/// Modules requested, in precedence order when keys collide
const MODULES: &[&str] = &[
    "price",
    "summaryDetail",
    "financialData",
    "assetProfile",
    "defaultKeyStatistics",
];

/// Rupees per Crore
const CRORE: f64 = 10_000_000.0;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryEnvelope {
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    error: Option<Value>,
}

/// All module fields merged into one map.
#[derive(Debug, Default)]
struct FlatQuote(HashMap<String, Value>);

impl FlatQuote {
    fn from_modules(modules: &Map<String, Value>) -> Self {
        let mut fields = HashMap::new();
        for module in MODULES {
            let Some(Value::Object(body)) = modules.get(*module) else {
                continue;
            };
            for (key, value) in body {
                let value = match value {
                    Value::Object(inner) => match inner.get("raw") {
                        Some(raw) => raw.clone(),
                        None => continue,
                    },
                    other => other.clone(),
                };
                fields.entry(key.clone()).or_insert(value);
            }
        }
        Self(fields)
    }

    fn num(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    /// Fraction to percentage
    fn pct(&self, key: &str) -> Option<f64> {
        self.num(key).map(|v| v * 100.0)
    }
}

/// Build a normalized record from flattened quote-summary fields.
fn normalize(
    symbol: &str,
    quote: &FlatQuote,
    fetched_at: DateTime<Utc>,
) -> Result<QuoteRecord, ProviderError> {
    let price = quote
        .num("regularMarketPrice")
        .or_else(|| quote.num("currentPrice"))
        .ok_or_else(|| ProviderError::DataNotAvailable(format!("no price for {}", symbol)))?;

    let roe = quote.pct("returnOnEquity");

    Ok(QuoteRecord {
        symbol: symbol.to_string(),
        name: quote
            .text("longName")
            .or_else(|| quote.text("shortName"))
            .unwrap_or_else(|| symbol.to_string()),
        price,
        market_cap: quote.num("marketCap").map_or(0.0, |v| v / CRORE),
        pe_ratio: quote
            .num("trailingPE")
            .or_else(|| quote.num("forwardPE"))
            .unwrap_or(0.0),
        roe: roe.unwrap_or(0.0),
        debt_to_equity: quote.num("debtToEquity").map_or(0.0, |v| v / 100.0),
        current_ratio: quote.num("currentRatio").unwrap_or(0.0),
        sector: quote.text("sector").unwrap_or_else(|| "Unknown".into()),
        industry: quote.text("industry").unwrap_or_else(|| "Unknown".into()),
        volume: quote
            .num("regularMarketVolume")
            .or_else(|| quote.num("volume"))
            .map_or(0, |v| v.max(0.0) as u64),
        change: quote.num("regularMarketChange").unwrap_or(0.0),
        change_percent: quote.pct("regularMarketChangePercent").unwrap_or(0.0),
        high_52w: quote.num("fiftyTwoWeekHigh").unwrap_or(0.0),
        low_52w: quote.num("fiftyTwoWeekLow").unwrap_or(0.0),
        fundamentals: Fundamentals {
            opm_growth: quote.pct("profitMargins").map(|v| v.max(0.0)),
            pat_growth: quote.pct("earningsGrowth"),
            sales_growth: quote.pct("revenueGrowth"),
            // No multi-year history upstream; current ROE stands in.
            avg_roe_5y: roe,
            fii_holding: quote.pct("heldPercentInstitutions"),
            ..Fundamentals::default()
        },
        fetched_at,
    })
}

// ============================================================================
// Adapter
// ============================================================================

/// Quote fetcher backed by the Yahoo Finance quote-summary API.
pub struct YahooQuoteAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl YahooQuoteAdapter {
    /// Create a new adapter from configuration.
    pub fn new(config: &QuotesConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn summary_url(&self, symbol: &str) -> String {
        format!(
            "{}{}/{}?modules={}",
            self.base_url,
            QUOTE_SUMMARY_ENDPOINT,
            symbol,
            MODULES.join(",")
        )
    }
}

#[async_trait]
impl QuoteFetcher for YahooQuoteAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, ProviderError> {
        let url = self.summary_url(symbol);
        debug!(symbol, url = %url, "Fetching quote summary");

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(symbol.to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let envelope: QuoteSummaryEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(err) = envelope.quote_summary.error.filter(|e| !e.is_null()) {
            let description = err
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ProviderError::DataNotAvailable(format!(
                "{}: {}",
                symbol, description
            )));
        }

        let modules = envelope
            .quote_summary
            .result
            .and_then(|mut r| (!r.is_empty()).then(|| r.swap_remove(0)))
            .ok_or_else(|| ProviderError::DataNotAvailable(symbol.to_string()))?;

        normalize(symbol, &FlatQuote::from_modules(&modules), Utc::now())
    }
}

// ============================================================================
// Tests
// ============================================================================
