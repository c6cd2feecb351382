//! Criteria screening.
//!
//! - **criteria**: metric/bound model and request parsing
//! - **evaluator**: pure conjunctive matching
//! - **presets**: named criteria catalog
//! - **fixtures**: offline reference records
//! - **engine**: orchestration over live data, fixtures and the watchlist

pub mod criteria;
pub mod engine;
pub mod evaluator;
pub mod fixtures;
pub mod presets;

pub use criteria::{Bound, CriteriaError, CriteriaSet, Metric, ParsedCriteria};
pub use engine::{
    DataSource, EnrichedStock, Performance, QuoteSource, ScreenOutcome, ScreenerEngine,
    WatchlistPage,
};
pub use evaluator::{failed_metrics, matches};
pub use fixtures::fixture_records;
pub use presets::{Preset, PresetCatalog};
