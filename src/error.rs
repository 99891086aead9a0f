//! Error taxonomy for the evaluation pipeline.
//!
//! Only [`RunError`] can escape [`Evaluator::run`](crate::evaluate::Evaluator::run):
//! a dataset that fails to load, or telemetry that fails to flush. Every
//! per-item failure (extraction, scoring, persistence) is absorbed where it
//! happens and turned into a degraded but valid result.

use thiserror::Error;

/// Failure to materialize a dataset. Always fatal to the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse dataset CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: column '{column}' is not valid JSON: {source}")]
    Json {
        row: usize,
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dataset item {item}: missing field '{field}'")]
    MissingField { item: String, field: &'static str },

    #[error("Remote dataset error: {0}")]
    Remote(String),
}

/// Failure to compute a similarity score.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Failed to serialize value for scoring: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure while writing extraction results to the persistence sink.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Not enough data to persist: {0}")]
    Incomplete(String),
}

/// Failure to deliver buffered telemetry to the tracking backend.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Tracking backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tracking backend rejected {count} event(s): {detail}")]
    Rejected { count: usize, detail: String },

    #[error("Tracking backend unavailable after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Run-fatal errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Flush error: {0}")]
    Flush(#[from] FlushError),
}
