//! Watchlist reference data.
//!
//! A screener export (CSV) listing the user's stocks together with reference
//! price and ratios. The file is re-read at most once per freshness window.
//!
//! Expected headers:
//! `Name, NSE Code, BSE Code, Current Price, Price to Earning,
//!  Return on equity, Debt to equity, Industry, Industry Group`

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use screener_common::error::{Error, Result, ResultExt};
use screener_common::{CacheConfig, WatchlistConfig};

use super::clock::Clock;

/// One row of the watchlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistEntry {
    /// `NSE.NS` when an NSE code exists, otherwise `BSE.BO`
    pub symbol: String,
    pub name: String,
    pub nse_code: String,
    pub bse_code: String,
    /// Reference price from the export
    pub price: f64,
    pub pe_ratio: f64,
    pub roe: f64,
    pub debt_to_equity: f64,
    pub industry: String,
    pub industry_group: String,
}

// ============================================================================
// CSV Parsing
// ============================================================================

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
struct Columns {
    name: Option<usize>,
    nse_code: Option<usize>,
    bse_code: Option<usize>,
    price: Option<usize>,
    pe_ratio: Option<usize>,
    roe: Option<usize>,
    debt_to_equity: Option<usize>,
    industry: Option<usize>,
    industry_group: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut cols = Self::default();
        for (idx, header) in headers.iter().enumerate() {
            let slot = match header.trim().to_ascii_lowercase().as_str() {
                "name" => &mut cols.name,
                "nse code" => &mut cols.nse_code,
                "bse code" => &mut cols.bse_code,
                "current price" => &mut cols.price,
                "price to earning" => &mut cols.pe_ratio,
                "return on equity" => &mut cols.roe,
                "debt to equity" => &mut cols.debt_to_equity,
                "industry" => &mut cols.industry,
                "industry group" => &mut cols.industry_group,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        cols
    }
}

fn field<'r>(row: &'r csv::StringRecord, col: Option<usize>) -> &'r str {
    col.and_then(|i| row.get(i)).map(str::trim).unwrap_or("")
}

/// Lenient number parsing: thousands separators are dropped, junk is 0.
fn number(raw: &str) -> f64 {
    raw.replace(',', "").parse::<f64>().unwrap_or(0.0)
}

fn text_or_unknown(raw: &str) -> String {
    if raw.is_empty() {
        "Unknown".to_string()
    } else {
        raw.to_string()
    }
}

/// Parse watchlist rows from CSV.
///
/// Rows without a name, or without both exchange codes, are skipped, as are
/// rows the CSV reader cannot decode.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<WatchlistEntry>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("watchlist header: {}", e)))?
        .clone();
    let cols = Columns::from_headers(&headers);
    if cols.name.is_none() {
        return Err(Error::InvalidInput("watchlist has no Name column".into()));
    }

    let mut entries = Vec::new();
    for (line, row) in csv_reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                debug!(line = line + 2, error = %e, "Skipping unreadable watchlist row");
                continue;
            }
        };

        let name = field(&row, cols.name);
        let nse_code = field(&row, cols.nse_code);
        let bse_code = field(&row, cols.bse_code);
        let symbol = if !nse_code.is_empty() {
            format!("{}.NS", nse_code)
        } else if !bse_code.is_empty() {
            format!("{}.BO", bse_code)
        } else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        entries.push(WatchlistEntry {
            symbol,
            name: name.to_string(),
            nse_code: nse_code.to_string(),
            bse_code: bse_code.to_string(),
            price: number(field(&row, cols.price)),
            pe_ratio: number(field(&row, cols.pe_ratio)),
            roe: number(field(&row, cols.roe)),
            debt_to_equity: number(field(&row, cols.debt_to_equity)),
            industry: text_or_unknown(field(&row, cols.industry)),
            industry_group: text_or_unknown(field(&row, cols.industry_group)),
        });
    }

    Ok(entries)
}

/// Load a watchlist file.
pub fn load_from(path: &Path) -> Result<Vec<WatchlistEntry>> {
    let file = File::open(path).context(format!("opening {}", path.display()))?;
    parse_csv(file)
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone)]
struct Snapshot {
    entries: Arc<Vec<WatchlistEntry>>,
    source: Option<PathBuf>,
    loaded_at: DateTime<Utc>,
}

/// Watchlist cached for a freshness window.
pub struct WatchlistStore {
    paths: Vec<PathBuf>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<Snapshot>>,
}

impl WatchlistStore {
    pub fn new(paths: Vec<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            paths,
            ttl,
            clock,
            slot: RwLock::new(None),
        }
    }

    pub fn from_config(
        watchlist: &WatchlistConfig,
        cache: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            watchlist.resolved_paths(),
            Duration::from_secs(cache.watchlist_ttl_secs),
            clock,
        )
    }

    /// First candidate path that exists.
    pub fn resolve_path(&self) -> Option<PathBuf> {
        self.paths.iter().find(|p| p.is_file()).cloned()
    }

    /// Current watchlist, re-read when the window has passed.
    ///
    /// A missing file yields an empty list. A read failure keeps the previous
    /// snapshot when there is one.
    pub fn entries(&self) -> Arc<Vec<WatchlistEntry>> {
        let now = self.clock.now();
        if let Some(snapshot) = self.fresh_snapshot(now) {
            return snapshot.entries;
        }

        let previous = self.slot.read().ok().and_then(|s| s.clone());
        let (entries, source) = match self.resolve_path() {
            Some(path) => match load_from(&path) {
                Ok(entries) => {
                    info!(path = %path.display(), count = entries.len(), "Watchlist loaded");
                    (Arc::new(entries), Some(path))
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read watchlist");
                    match previous {
                        Some(prev) => (prev.entries, prev.source),
                        None => (Arc::new(Vec::new()), None),
                    }
                }
            },
            None => {
                warn!(candidates = self.paths.len(), "No watchlist file found");
                (Arc::new(Vec::new()), None)
            }
        };

        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(Snapshot {
                entries: Arc::clone(&entries),
                source,
                loaded_at: now,
            });
        }
        entries
    }

    /// Path the current snapshot was read from.
    pub fn source(&self) -> Option<PathBuf> {
        self.slot
            .read()
            .ok()
            .and_then(|s| s.as_ref().and_then(|snap| snap.source.clone()))
    }

    /// Force a re-read on next access.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }

    fn fresh_snapshot(&self, now: DateTime<Utc>) -> Option<Snapshot> {
        let slot = self.slot.read().ok()?;
        let snapshot = slot.as_ref()?;
        let age = now
            .signed_duration_since(snapshot.loaded_at)
            .to_std()
            .unwrap_or_default();
        (age < self.ttl).then(|| snapshot.clone())
    }
}
