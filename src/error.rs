//! Error types for the tracker.
//!
//! Malformed study data is never an error; it is skipped during
//! aggregation. Only caller input, the remote feed and the store can fail.

use thiserror::Error;

/// Rejected caller input. Retrying with the same input will fail again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("drug name must not be blank")]
    BlankDrugName,

    #[error("side effect name must not be blank")]
    BlankSideEffectName,

    #[error("probability {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f64),
}

/// Failures talking to the study feed. Distinct from "zero studies found".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cannot connect to {url}")]
    Connect { url: String },

    #[error("study feed returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode study feed response: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Failures of the report store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid timestamp in store: {0}")]
    InvalidTimestamp(String),

    #[error("drug '{0}' not found")]
    UnknownDrug(String),
}

/// Any failure of a tracker operation.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
