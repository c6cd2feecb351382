//! HTTP routes for the screener service.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

use screener_common::logging::trace_id_from_headers;
use screener_common::request_span;

use crate::data::{BatchFailure, CacheStats, QuoteRecord};
use crate::error::ApiError;
use crate::pagination::{PageRequest, PaginationMeta};
use crate::screener::{CriteriaSet, EnrichedStock, Performance, PresetCatalog, ScreenOutcome};
use crate::ScreenerState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Envelope
// ============================================================================

/// Success envelope shared by every data endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
    pub timestamp: String,
}

fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        status: "success",
        data,
        timestamp: now(),
    })
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// Request Types
// ============================================================================

/// Ad-hoc screen request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenRequest {
    #[serde(default)]
    pub criteria: Option<Value>,
    #[serde(default)]
    pub use_fallback: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetQuery {
    #[serde(default)]
    pub use_fallback: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct FiltersResponse {
    pub filters: PresetCatalog,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ScreenResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub stocks: Vec<Arc<QuoteRecord>>,
    pub total: usize,
    pub total_checked: usize,
    pub criteria: CriteriaSet,
    pub criteria_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_keys: Vec<String>,
    pub data_source: &'static str,
    pub stale_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<BatchFailure>,
    pub elapsed_ms: u64,
}

impl ScreenResponse {
    fn new(outcome: ScreenOutcome, criteria: CriteriaSet, ignored_keys: Vec<String>) -> Self {
        Self {
            filter_name: None,
            description: None,
            total: outcome.records.len(),
            stocks: outcome.records,
            total_checked: outcome.total_checked,
            criteria_count: criteria.len(),
            criteria,
            ignored_keys,
            data_source: outcome.source.label(),
            stale_count: outcome.stale_count,
            failed: outcome.failures,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct YourStocksResponse {
    pub title: String,
    pub description: String,
    pub stocks: Vec<EnrichedStock>,
    pub total: usize,
    pub pagination: PaginationMeta,
    pub performance: Performance,
    pub data_sources: Vec<String>,
    pub comparison_available: bool,
}

#[derive(Debug, Serialize)]
pub struct PreloadResponse {
    pub status: &'static str,
    pub message: String,
    pub scheduled: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub provider: &'static str,
    pub quotes: CacheStats,
    pub watchlist_entries: usize,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Stock Screener API is running",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now(),
    })
}

/// List the named criteria sets
pub async fn filters(State(state): State<Arc<ScreenerState>>) -> Json<ApiResponse<FiltersResponse>> {
    let catalog = state.engine.presets().clone();
    success(FiltersResponse {
        count: catalog.len(),
        filters: catalog,
    })
}

/// Screen with ad-hoc criteria
pub async fn screen(
    State(state): State<Arc<ScreenerState>>,
    headers: HeaderMap,
    body: Result<Json<ScreenRequest>, JsonRejection>,
) -> ApiResult<ScreenResponse> {
    let trace_id = trace_id_from_headers(&headers);
    let Json(ScreenRequest {
        criteria,
        use_fallback,
    }) = body?;

    let raw = criteria.ok_or_else(|| ApiError::BadRequest("No criteria provided".into()))?;
    let parsed = CriteriaSet::from_value(&raw)?;

    let span = request_span!("screen", trace_id, use_fallback);
    async move {
        let outcome = state.engine.screen(&parsed.criteria, use_fallback).await?;
        Ok::<_, ApiError>(success(ScreenResponse::new(
            outcome,
            parsed.criteria,
            parsed.ignored_keys,
        )))
    }
    .instrument(span)
    .await
}

/// Screen with a named preset
pub async fn screen_preset(
    State(state): State<Arc<ScreenerState>>,
    Path(filter_name): Path<String>,
    headers: HeaderMap,
    query: Result<Query<PresetQuery>, QueryRejection>,
) -> ApiResult<ScreenResponse> {
    let trace_id = trace_id_from_headers(&headers);
    let Query(query) = query?;

    let span = request_span!("screen_preset", trace_id, filter = %filter_name);
    async move {
        let outcome = state
            .engine
            .screen_preset(&filter_name, query.use_fallback)
            .await?;

        let mut response = ScreenResponse::new(outcome, CriteriaSet::new(), Vec::new());
        if let Some(preset) = state.engine.presets().get(&filter_name) {
            response.criteria_count = preset.criteria.len();
            response.criteria = preset.criteria.clone();
            response.filter_name = Some(preset.name.clone());
            response.description = Some(preset.description.clone());
        }
        Ok::<_, ApiError>(success(response))
    }
    .instrument(span)
    .await
}

/// Paginated, quote-enriched watchlist
pub async fn your_stocks(
    State(state): State<Arc<ScreenerState>>,
    headers: HeaderMap,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<YourStocksResponse> {
    let trace_id = trace_id_from_headers(&headers);
    let Query(query) = query?;
    let request = PageRequest::new(query.page, query.per_page, &state.config.pagination)?;

    let span = request_span!("your_stocks", trace_id, page = request.page);
    let page = state.engine.your_stocks(request).instrument(span).await;

    let meta = page.pagination;
    let mut data_sources = Vec::new();
    if let Some(path) = page.source_path {
        data_sources.push(format!("Watchlist CSV ({})", path));
    }
    data_sources.push(format!("{} (cached + live)", state.engine.batch().cache().provider_name()));

    Ok(success(YourStocksResponse {
        title: format!("Your Stocks - Page {}/{}", meta.current_page, meta.total_pages),
        description: format!("{} stocks from your watchlist", page.stocks.len()),
        total: page.stocks.len(),
        stocks: page.stocks,
        pagination: meta,
        performance: page.performance,
        data_sources,
        comparison_available: true,
    }))
}

/// Start background cache warming
pub async fn preload_cache(State(state): State<Arc<ScreenerState>>) -> Json<PreloadResponse> {
    let scheduled = state.engine.preload(state.config.screener.preload_count);
    Json(PreloadResponse {
        status: "success",
        message: format!("Cache preload started for {} stocks", scheduled),
        scheduled,
        timestamp: now(),
    })
}

/// Quote cache statistics
pub async fn cache_stats(State(state): State<Arc<ScreenerState>>) -> Json<ApiResponse<CacheStatsResponse>> {
    let cache = state.engine.batch().cache();
    success(CacheStatsResponse {
        provider: cache.provider_name(),
        quotes: cache.stats(),
        watchlist_entries: state.engine.watchlist().entries().len(),
    })
}

/// Single stock quote
pub async fn stock(
    State(state): State<Arc<ScreenerState>>,
    Path(ticker): Path<String>,
) -> ApiResult<Arc<QuoteRecord>> {
    let record = state.engine.stock(&ticker).await?;
    Ok(success(record))
}
