//! Configuration validation for the screener service.
//!
//! Rejects values that would make the service misbehave at runtime
//! (a zero-sized worker pool, zero-length cache windows, and so on).

use thiserror::Error;

use crate::config::{BatchConfig, CacheConfig, Config, PaginationConfig, ServerConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 4] =
            [&self.server, &self.cache, &self.batch, &self.pagination];

        let mut errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        if self.quotes.base_url.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "quotes.base_url".into(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides, then validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        Ok(())
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.quote_ttl_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "cache.quote_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.watchlist_ttl_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "cache.watchlist_ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_entries == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "cache.max_entries".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }
        Ok(())
    }
}

impl Validate for BatchConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "batch.concurrency".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.item_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "batch.item_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for PaginationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.default_per_page == 0 || self.max_per_page == 0 {
            return Err(ValidationError::InvalidValue {
                field: "pagination".into(),
                reason: "page sizes must be greater than 0".into(),
            });
        }
        if self.default_per_page > self.max_per_page {
            return Err(ValidationError::InvalidValue {
                field: "pagination.default_per_page".into(),
                reason: format!("exceeds max_per_page ({})", self.max_per_page),
            });
        }
        Ok(())
    }
}
