//! Error types for CardComply.
//!
//! Library crates use [`CardComplyError`] via `thiserror`.
//! The server app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all CardComply operations.
#[derive(Debug, thiserror::Error)]
pub enum CardComplyError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during card fetch or enrichment.
    #[error("network error: {0}")]
    Network(String),

    /// Document parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Template loading or merge error.
    #[error("template error: {0}")]
    Template(String),

    /// Retention store error.
    #[error("retention error: {0}")]
    Retention(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad JSON answer map, invalid filename, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A referenced resource (card, template, artifact) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CardComplyError>;

impl CardComplyError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CardComplyError::config("missing template dir");
        assert_eq!(err.to_string(), "config error: missing template dir");

        let err = CardComplyError::validation("answer map is not a JSON object");
        assert!(err.to_string().contains("JSON object"));
    }
}
