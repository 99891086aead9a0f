//! Core data models used throughout the evaluation pipeline.
//!
//! These types represent the dataset items, extraction requests and
//! outcomes, and score records that flow from the dataset source through
//! the extraction service to the tracking backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A labeled evaluation example.
///
/// `input` is either free text or a post object (`caption`, `date`,
/// optional `image_path`). Items are immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    pub input: Value,
    pub expected_output: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DatasetItem {
    pub fn new(id: impl Into<String>, input: Value, expected_output: Value) -> Self {
        Self {
            id: id.into(),
            input,
            expected_output,
            metadata: Map::new(),
        }
    }

    /// Identifier shown in logs and attached to traces as `post_id`.
    ///
    /// Uses `input.id` when the input is a post object carrying one,
    /// otherwise the item's position in the dataset.
    pub fn display_id(&self, index: usize) -> Value {
        match self.input.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => Value::from(index),
        }
    }
}

/// Normalized request body for the extraction workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionRequest {
    pub post: String,
    pub date: String,
    /// Whether the source post referenced an image. Never transmitted.
    #[serde(skip)]
    pub has_image: bool,
}

/// Why a call to the extraction service never produced an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFailureKind {
    Timeout,
    ConnectionRefused,
    Other,
}

impl std::fmt::Display for NetworkFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NetworkFailureKind::Timeout => "timeout",
            NetworkFailureKind::ConnectionRefused => "connection refused",
            NetworkFailureKind::Other => "network error",
        };
        f.write_str(s)
    }
}

/// Result of exactly one extraction call. Every invocation ends in one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// HTTP 200 with a resolvable payload.
    Success(Value),
    /// Non-200 status, or a 200 whose body could not be resolved.
    ApiError { status: u16, body: String },
    /// No HTTP response at all.
    NetworkFailure {
        kind: NetworkFailureKind,
        message: String,
    },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    /// Short label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionOutcome::Success(_) => "success",
            ExtractionOutcome::ApiError { .. } => "api_error",
            ExtractionOutcome::NetworkFailure { .. } => "network_failure",
        }
    }
}

/// Similarity score recorded against one trace.
///
/// `distance + similarity == 1` always holds; construct through
/// [`ScoreRecord::from_distance`] or [`ScoreRecord::worst`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub trace_id: String,
    pub similarity: f64,
    pub distance: f64,
}

impl ScoreRecord {
    pub fn from_distance(trace_id: impl Into<String>, distance: f64) -> Self {
        let distance = distance.clamp(0.0, 1.0);
        Self {
            trace_id: trace_id.into(),
            similarity: 1.0 - distance,
            distance,
        }
    }

    /// Score substituted when the scorer itself fails.
    pub fn worst(trace_id: impl Into<String>) -> Self {
        Self::from_distance(trace_id, 1.0)
    }
}

/// Run-level parameters attached to every trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub run_name: String,
    pub run_description: String,
    pub evaluator_model: String,
    pub metrics: Vec<String>,
}
