//! Screener Service Library
//!
//! Filters a fixed universe of equities against numeric criteria using
//! cached quote data, and serves an enriched, paginated watchlist.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  screener-service (Rust Service)                    │
//! │                              :5001                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Quote Fetcher  │→ │  TTL Cache      │→ │  Batch          │     │
//! │  │  (Yahoo)        │  │  (per-key lock) │  │  Processor      │     │
//! │  └─────────────────┘  └─────────────────┘  └────────┬────────┘     │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌────────▼────────┐     │
//! │  │  Watchlist CSV  │  │  Presets        │→ │  Screener       │     │
//! │  │  (TTL snapshot) │→ │  + Evaluator    │  │  Engine         │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod error;
pub mod pagination;
pub mod routes;
pub mod screener;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use screener_common::config::Config;

use crate::data::{
    BatchProcessor, Clock, QuoteCache, QuoteFetcher, SystemClock, WatchlistStore,
    YahooQuoteAdapter,
};
use crate::screener::{PresetCatalog, ScreenerEngine};

/// Screener service state
pub struct ScreenerState {
    /// Configuration
    pub config: Config,
    /// Screening engine
    pub engine: ScreenerEngine,
}

impl ScreenerState {
    /// Create state backed by the live quote provider.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher =
            YahooQuoteAdapter::new(&config.quotes).context("Failed to build quote client")?;
        Self::with_fetcher(config, Arc::new(fetcher), Arc::new(SystemClock))
    }

    /// Create state with an explicit fetcher and clock.
    pub fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn QuoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache = Arc::new(QuoteCache::with_capacity(
            fetcher,
            Arc::clone(&clock),
            Duration::from_secs(config.cache.quote_ttl_secs),
            config.cache.max_entries,
        ));
        let batch = BatchProcessor::from_config(cache, &config.batch);
        let watchlist = Arc::new(WatchlistStore::from_config(
            &config.watchlist,
            &config.cache,
            clock,
        ));

        let presets = PresetCatalog::with_overrides(&config.screener.presets).map_err(
            |(id, err)| anyhow::anyhow!("Invalid preset \"{}\": {}", id, err),
        )?;

        tracing::info!(
            presets = ?presets.ids().collect::<Vec<_>>(),
            universe = config.screener.universe.len(),
            concurrency = batch.concurrency(),
            "Screener state initialized"
        );

        let engine = ScreenerEngine::new(
            batch,
            watchlist,
            presets,
            config.screener.universe.clone(),
        );

        Ok(Self { config, engine })
    }
}

/// Build the HTTP router over shared state.
pub fn build_router(state: Arc<ScreenerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/screener/filters", get(routes::filters))
        .route("/api/screener/screen", post(routes::screen))
        .route("/api/screener/screen/:filter_name", get(routes::screen_preset))
        .route("/api/screener/your-stocks", get(routes::your_stocks))
        .route("/api/screener/preload-cache", post(routes::preload_cache))
        .route("/api/screener/cache/stats", get(routes::cache_stats))
        .route("/api/stock/:ticker", get(routes::stock))
        .layer(cors)
        .with_state(state)
}

/// Main screener service
pub struct ScreenerService {
    state: Arc<ScreenerState>,
}

impl ScreenerService {
    /// Create a new screener service
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(ScreenerState::new(config)?);
        Ok(Self { state })
    }

    /// Start the screener service
    pub async fn start(self) -> Result<()> {
        let app = build_router(Arc::clone(&self.state));

        let addr: SocketAddr = self.state.config.bind_address().parse()?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
