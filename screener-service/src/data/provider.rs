//! Quote provider abstraction.
//!
//! Every upstream source implements `QuoteFetcher`, so the cache and batch
//! layers never depend on a concrete HTTP client.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::QuoteRecord;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to quote providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited")]
    RateLimited,

    /// Upstream returned no usable data for the symbol
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Upstream responded with an unexpected status
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Payload did not match the expected shape
    #[error("Malformed response: {0}")]
    Parse(String),

    /// The per-item deadline elapsed
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Check if the error is transient (worth serving stale data for)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited | Self::Unavailable(_) | Self::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

// ============================================================================
// Quote Fetcher Trait
// ============================================================================

/// Trait for quote providers.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Provider name, used in logs and response metadata
    fn name(&self) -> &'static str;

    /// Fetch one symbol's quote.
    async fn fetch(&self, symbol: &str) -> Result<QuoteRecord, ProviderError>;
}
