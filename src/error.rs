//! Custom error types for tallybook
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for tallybook operations
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Validation errors for data models
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Import/parse errors (GnuCash or CSV); the whole import is aborted
    #[error("Import error: {0}")]
    Import(String),

    /// Journal entry validation or save errors
    #[error("Journal error: {0}")]
    Journal(String),
}

impl Error {
    /// Create a "not found" error for estimates
    pub fn estimate_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Estimate",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for assignment rules
    pub fn rule_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Rule",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an import error
    pub fn is_import(&self) -> bool {
        matches!(self, Self::Import(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::Import(err.to_string())
    }
}

/// Result type alias for tallybook operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Import("bad book element".into());
        assert_eq!(err.to_string(), "Import error: bad book element");
    }

    #[test]
    fn test_not_found_error() {
        let err = Error::estimate_not_found("42");
        assert_eq!(err.to_string(), "Estimate not found: 42");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
