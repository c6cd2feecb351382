//! Screener Common - Shared configuration, errors and logging for the screener service.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.screener/config.json` + `SCREENER_*` env)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and request trace ids

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    BatchConfig, CacheConfig, Config, ObservabilityConfig, PageOverflow, PaginationConfig,
    PresetConfig, QuotesConfig, ScreenerConfig, ServerConfig, WatchlistConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
