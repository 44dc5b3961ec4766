//! Error types shared across the harness.

use std::path::PathBuf;
use thiserror::Error;

use crate::metrics::AccumulatorState;

/// A malformed line in a people or pairs file.
///
/// Never fatal: the loader skips the line and records a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected} tab-separated fields, got {actual}")]
    FieldCount { expected: &'static str, actual: usize },
    #[error("invalid {field} {value:?}: not a non-negative integer")]
    InvalidNumber { field: &'static str, value: String },
    #[error("empty group identifier")]
    EmptyGroup,
}

/// The external verification call failed for one pair.
///
/// Covers unreadable images, no face found and backend faults alike. The pair
/// is skipped and logged to the exception ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct VerificationFailure {
    pub message: String,
}

impl VerificationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An accumulator operation was called out of state-machine order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {operation} while accumulator is {state}")]
pub struct InvalidStateError {
    pub state: AccumulatorState,
    pub operation: &'static str,
}

/// Unrecoverable run errors.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to read {}: {source}", path.display())]
    ReadIndex {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
}
