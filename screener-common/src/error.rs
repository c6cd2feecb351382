//! Error types for the screener service.

use thiserror::Error;

/// Result type alias using the screener error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the screener crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream data source error
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a client-side error (bad request or unknown resource).
    ///
    /// Timeouts carry 408 but are upstream failures, so they do not count.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code(), 400 | 404)
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) | Self::Json(_) => 400,
            Self::Timeout => 408,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::NotFound("preset".into()).status_code(), 404);
        assert_eq!(Error::InvalidInput("per_page".into()).status_code(), 400);
        assert_eq!(Error::Upstream("yahoo".into()).status_code(), 500);
        assert_eq!(Error::Internal("test".into()).status_code(), 500);
        assert_eq!(Error::Timeout.status_code(), 408);
    }

    #[test]
    fn test_timeout_is_not_client_error() {
        assert!(!Error::Timeout.is_client_error());
        assert!(!Error::Timeout.with_context("fetching quote").is_client_error());
        assert!(Error::InvalidInput("page".into()).is_client_error());
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::NotFound("quality".into());
        let with_ctx = err.with_context("resolving preset");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert_eq!(with_ctx.status_code(), 404);
        assert!(with_ctx.is_client_error());
        assert!(with_ctx.to_string().starts_with("resolving preset"));
    }

    #[test]
    fn test_result_ext_context() {
        let parsed: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{not json");
        let err = parsed.context("parsing criteria").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
