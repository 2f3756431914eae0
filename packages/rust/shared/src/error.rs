//! Error types for fieldmap.
//!
//! Library crates use [`FieldMapError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all fieldmap operations.
#[derive(Debug, thiserror::Error)]
pub enum FieldMapError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error raised by the crawl worker.
    #[error("network error: {0}")]
    Network(String),

    /// Content extraction error other than I/O.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Rule or table validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Reading a column from a query row failed.
    #[error("data access error on column {column:?}: {message}")]
    DataAccess { column: String, message: String },

    /// A rule's find pattern does not compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    /// A crawl-enabled column does not hold a valid URL.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// The crawl subsystem failed outside of its timeout budgets.
    #[error("crawl error: {0}")]
    Crawl(String),

    /// Rule serialization (XML) error.
    #[error("xml error: {0}")]
    Xml(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FieldMapError>;

impl FieldMapError {
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

    /// Create a data access error for the given column.
    pub fn data_access(column: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DataAccess {
            column: column.into(),
            message: msg.into(),
        }
    }

    /// Whether this error is an extraction I/O fault, which a row survives.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FieldMapError::config("no crawl worker provisioned");
        assert_eq!(err.to_string(), "config error: no crawl worker provisioned");

        let err = FieldMapError::data_access("title", "connection reset");
        assert!(err.to_string().contains("\"title\""));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn only_io_is_recoverable() {
        let io = FieldMapError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(io.is_io());
        assert!(!FieldMapError::parse("bad header").is_io());
    }
}
