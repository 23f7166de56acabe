//! Unified error type for remedial-action optimization.
//!
//! [`RaoError`] is reserved for run-level failures: malformed input, an
//! inconsistent CRAC, a network element that cannot be found, or an exhausted
//! wall-clock budget. Conditions the optimizer recovers from locally (a state
//! whose sensitivity diverged, a range action filtered out of a perimeter, an
//! infeasible linear problem) are reported as status values instead.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{RaoError, RaoResult};
//!
//! fn load(path: &str) -> RaoResult<Crac> {
//!     let text = std::fs::read_to_string(path)?;
//!     let crac: Crac = serde_json::from_str(&text)?;
//!     crac.ensure_valid(None)?;
//!     Ok(crac)
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Error type for all run-level RAO failures.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration inconsistencies detected before any search begins
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network lookups or mutations that cannot be carried out
    #[error("Network error: {0}")]
    Network(String),

    /// The global wall-clock budget of the run has been exhausted
    #[error("Optimization exceeded its time budget of {0:?}")]
    Timeout(Duration),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaoError::Config("missing preventive state".into());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing preventive state"));
    }

    #[test]
    fn test_timeout_display() {
        let err = RaoError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("time budget"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let rao_err: RaoError = io_err.into();
        assert!(matches!(rao_err, RaoError::Io(_)));
    }

    #[test]
    fn test_json_error_is_parse_error() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let rao_err: RaoError = err.into();
        assert!(matches!(rao_err, RaoError::Parse(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> RaoResult<()> {
            Err(RaoError::Validation("test".into()))
        }

        fn outer() -> RaoResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
