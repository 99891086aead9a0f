//! Experiment-trace recording.
//!
//! The [`TraceRecorder`] trait is the pipeline's only view of the tracking
//! backend. Every call except [`flush`](TraceRecorder::flush) is
//! fire-and-forget: implementations buffer telemetry and deliver it when
//! flushed. A run that ends without a successful flush has lost telemetry,
//! so flush failures are surfaced to the caller.
//!
//! # Implementations
//!
//! | Type | Backend |
//! |------|---------|
//! | [`langfuse::LangfuseRecorder`] | Langfuse public ingestion API |
//! | [`DisabledRecorder`] | none; ids are generated, events discarded |
//! | [`memory::InMemoryRecorder`] | in-process; records every call for inspection |

pub mod langfuse;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::TrackingConfig;
use crate::error::FlushError;
use crate::models::{DatasetItem, RunMetadata};

/// Tag attached to every evaluation trace.
pub const EVALUATION_TAG: &str = "evaluation";

/// Name of the observation attached to each trace.
pub const OBSERVATION_NAME: &str = "process_post";

/// Everything needed to create one trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSpec {
    pub name: String,
    pub user_id: String,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
}

impl TraceSpec {
    /// Trace for one dataset item: named after the run, tagged `evaluation`.
    pub fn for_item(item: &DatasetItem, run: &RunMetadata, post_id: &Value) -> Self {
        let mut metadata = Map::new();
        metadata.insert("item_id".to_string(), json!(item.id));
        metadata.insert("evaluator_model".to_string(), json!(run.evaluator_model));
        metadata.insert("run_description".to_string(), json!(run.run_description));
        metadata.insert("metrics".to_string(), json!(run.metrics));
        metadata.insert("post_id".to_string(), post_id.clone());
        if !item.metadata.is_empty() {
            metadata.insert(
                "item_metadata".to_string(),
                Value::Object(item.metadata.clone()),
            );
        }

        Self {
            name: run.run_name.clone(),
            user_id: format!("item_{}", item.id),
            metadata,
            tags: vec![EVALUATION_TAG.to_string()],
        }
    }
}

/// The realized input/output pair attached to a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub name: String,
    pub input: Value,
    pub output: Value,
    pub metadata: Map<String, Value>,
}

impl Observation {
    pub fn new(input: Value, output: Value, post_id: &Value) -> Self {
        let mut metadata = Map::new();
        metadata.insert("post_id".to_string(), post_id.clone());
        Self {
            name: OBSERVATION_NAME.to_string(),
            input,
            output,
            metadata,
        }
    }
}

/// Sink for traces, observations and scores.
#[async_trait]
pub trait TraceRecorder: Send + Sync {
    /// Register a new trace and return its identifier.
    fn open(&self, spec: TraceSpec) -> String;

    fn record_observation(&self, trace_id: &str, observation: Observation);

    fn record_score(&self, trace_id: &str, name: &str, value: f64);

    /// Block until everything recorded so far has been delivered.
    async fn flush(&self) -> Result<(), FlushError>;
}

/// Recorder used when `tracking.provider = "disabled"`.
#[derive(Debug, Default)]
pub struct DisabledRecorder;

#[async_trait]
impl TraceRecorder for DisabledRecorder {
    fn open(&self, spec: TraceSpec) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(trace_id = %id, user_id = %spec.user_id, "tracking disabled; trace not sent");
        id
    }

    fn record_observation(&self, _trace_id: &str, _observation: Observation) {}

    fn record_score(&self, trace_id: &str, name: &str, value: f64) {
        tracing::debug!(%trace_id, name, value, "tracking disabled; score not sent");
    }

    async fn flush(&self) -> Result<(), FlushError> {
        Ok(())
    }
}

/// Build the recorder selected by `tracking.provider`.
pub fn create_recorder(config: &TrackingConfig) -> Result<Box<dyn TraceRecorder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledRecorder)),
        "langfuse" => {
            let client = langfuse::LangfuseClient::new(config)?;
            Ok(Box::new(langfuse::LangfuseRecorder::new(client, config)))
        }
        other => anyhow::bail!("Unknown tracking provider: {}", other),
    }
}
