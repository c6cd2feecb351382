//! Configuration management for the screener service.
//!
//! The service reads a single JSON file at `~/.screener/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SCREENER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SCREENER_HOST` → server.host
//! - `SCREENER_PORT` → server.port
//! - `SCREENER_LOG_LEVEL` → observability.log_level
//! - `SCREENER_LOG_FORMAT` → observability.log_format
//! - `SCREENER_QUOTE_BASE_URL` → quotes.base_url
//! - `SCREENER_WATCHLIST_PATH` → prepended to watchlist.paths

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".screener"),
        |dirs| dirs.home_dir().join(".screener"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// HTTP server bind settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Quote and watchlist cache windows
    #[serde(default)]
    pub cache: CacheConfig,

    /// Parallel batch fetching
    #[serde(default)]
    pub batch: BatchConfig,

    /// Upstream quote provider
    #[serde(default)]
    pub quotes: QuotesConfig,

    /// Watchlist reference file
    #[serde(default)]
    pub watchlist: WatchlistConfig,

    /// Screening universe and criteria presets
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Watchlist pagination
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SCREENER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SCREENER_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Some(level) = lookup("SCREENER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SCREENER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(url) = lookup("SCREENER_QUOTE_BASE_URL") {
            self.quotes.base_url = url;
        }
        if let Some(path) = lookup("SCREENER_WATCHLIST_PATH") {
            self.watchlist.paths.insert(0, path);
        }
    }

    /// Socket address string for the HTTP server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ============================================================================
// Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host. Default "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Freshness windows for cached data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Quote freshness window in seconds
    #[serde(default = "default_quote_ttl")]
    pub quote_ttl_secs: u64,

    /// Watchlist reference data freshness window in seconds
    #[serde(default = "default_watchlist_ttl")]
    pub watchlist_ttl_secs: u64,

    /// Upper bound on cached quotes. Unbounded when absent; least recently
    /// refreshed entries are evicted first when set.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: default_quote_ttl(),
            watchlist_ttl_secs: default_watchlist_ttl(),
            max_entries: None,
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Bounded worker pool used for per-symbol quote fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum concurrent fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Hard timeout per symbol in seconds
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            item_timeout_secs: default_item_timeout(),
        }
    }
}

// ============================================================================
// Quotes
// ============================================================================

/// Upstream quote provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotesConfig {
    /// Base URL of the quote-summary API
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_base_url(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

// ============================================================================
// Watchlist
// ============================================================================

/// Watchlist reference file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistConfig {
    /// Candidate CSV paths, tried in order. `~` is expanded.
    #[serde(default = "default_watchlist_paths")]
    pub paths: Vec<String>,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            paths: default_watchlist_paths(),
        }
    }
}

impl WatchlistConfig {
    /// Candidate paths with `~` expanded.
    pub fn resolved_paths(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
            .collect()
    }
}

// ============================================================================
// Screener
// ============================================================================

/// A user-defined criteria preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Criteria in request form, e.g. `{"roe": {"min": 15}}`
    #[serde(default)]
    pub criteria: serde_json::Map<String, serde_json::Value>,
}

/// Screening universe and presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Symbols screened by live criteria requests
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,

    /// Extra presets keyed by id; override built-ins with the same id
    #[serde(default)]
    pub presets: HashMap<String, PresetConfig>,

    /// Number of watchlist symbols warmed by a preload request
    #[serde(default = "default_preload_count")]
    pub preload_count: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            universe: default_universe(),
            presets: HashMap::new(),
            preload_count: default_preload_count(),
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// How out-of-range page numbers are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageOverflow {
    /// Out-of-range pages yield an empty slice
    #[default]
    Empty,
    /// Page numbers are clamped into `1..=total_pages`
    Clamp,
}

/// Watchlist pagination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size when the request gives none
    #[serde(default = "default_per_page")]
    pub default_per_page: usize,

    /// Largest accepted page size
    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,

    /// Out-of-range page policy
    #[serde(default)]
    pub overflow: PageOverflow,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
            overflow: PageOverflow::default(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5001
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_quote_ttl() -> u64 {
    300 // 5 minutes
}
fn default_watchlist_ttl() -> u64 {
    3600 // 1 hour
}
fn default_concurrency() -> usize {
    5
}
fn default_item_timeout() -> u64 {
    10
}
fn default_quote_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}
fn default_request_timeout() -> u64 {
    8
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) screener-service".into()
}
fn default_watchlist_paths() -> Vec<String> {
    vec![
        "./filter-conditions/stock-filter-criteria.csv".into(),
        "./stock-filter-criteria.csv".into(),
        "~/.screener/stock-filter-criteria.csv".into(),
    ]
}
fn default_preload_count() -> usize {
    20
}
fn default_per_page() -> usize {
    10
}
fn default_max_per_page() -> usize {
    100
}

fn default_universe() -> Vec<String> {
    [
        "RELIANCE.NS", "TCS.NS", "HDFCBANK.NS", "INFY.NS", "ICICIBANK.NS",
        "HINDUNILVR.NS", "SBIN.NS", "BHARTIARTL.NS", "ITC.NS", "KOTAKBANK.NS",
        "LT.NS", "AXISBANK.NS", "ASIANPAINT.NS", "MARUTI.NS", "SUNPHARMA.NS",
        "TITAN.NS", "BAJFINANCE.NS", "ULTRACEMCO.NS", "NESTLEIND.NS", "WIPRO.NS",
        "ONGC.NS", "NTPC.NS", "POWERGRID.NS", "TATAMOTORS.NS", "ADANIPORTS.NS",
        "COALINDIA.NS", "BAJAJFINSV.NS", "HCLTECH.NS", "DRREDDY.NS", "TECHM.NS",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.cache.quote_ttl_secs, 300);
        assert_eq!(config.cache.watchlist_ttl_secs, 3600);
        assert!(config.cache.max_entries.is_none());
        assert_eq!(config.batch.concurrency, 5);
        assert_eq!(config.batch.item_timeout_secs, 10);
        assert_eq!(config.pagination.overflow, PageOverflow::Empty);
        assert_eq!(config.screener.universe.len(), 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 8080}}, "pagination": {{"overflow": "clamp"}}}}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.pagination.overflow, PageOverflow::Clamp);
        assert_eq!(config.pagination.default_per_page, 10);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "SCREENER_PORT" => Some("9000".into()),
            "SCREENER_LOG_LEVEL" => Some("debug".into()),
            "SCREENER_WATCHLIST_PATH" => Some("/data/watchlist.csv".into()),
            _ => None,
        });

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.watchlist.paths[0], "/data/watchlist.csv");
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_bad_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "SCREENER_PORT").then(|| "abc".to_string()));
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_preset_config_parsing() {
        let json = r#"{
            "screener": {
                "presets": {
                    "cheap": {
                        "name": "Cheap",
                        "criteria": {"peRatio": {"max": 12}}
                    }
                }
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let preset = &config.screener.presets["cheap"];
        assert_eq!(preset.name, "Cheap");
        assert!(preset.description.is_empty());
        assert!(preset.criteria.contains_key("peRatio"));
    }
}
