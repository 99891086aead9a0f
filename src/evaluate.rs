//! Evaluation run orchestration.
//!
//! [`Evaluator`] walks a dataset strictly in order. For each item it opens a
//! trace, invokes the extraction service once, scores the produced value
//! against `expected_output`, and records the observation and score. Item
//! failures never abort the run:
//!
//! | Outcome | Produced value | Status |
//! |---------|----------------|--------|
//! | `Success(v)` | `v` | [`ItemStatus::Extracted`] |
//! | `ApiError` | `"API error: <status> - <body>"` | [`ItemStatus::ApiError`] |
//! | `NetworkFailure` | the item's `expected_output` | [`ItemStatus::Fallback`] |
//!
//! The fallback row scores a perfect similarity by construction; the run
//! summary reports those items separately.
//!
//! Only a dataset that fails to load, or a final flush that fails, ends the
//! run with an error.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, DbConfig, RunOverrides};
use crate::dataset::{open_source, DatasetSource};
use crate::error::RunError;
use crate::extraction::{Extractor, WorkflowClient};
use crate::models::{DatasetItem, ExtractionOutcome, RunMetadata};
use crate::persist::{save_results, EventSink, SqliteSink};
use crate::results::{ItemResult, ItemStatus, RunSummary};
use crate::scorer::{score_or_worst, JsonEditDistance, Scorer};
use crate::tracking::{create_recorder, Observation, TraceRecorder, TraceSpec};

/// Name of the score attached to every trace.
pub const SCORE_NAME: &str = "Similarity";

const DIAGNOSTIC_BODY_LIMIT: usize = 200;

pub struct Evaluator {
    extractor: Arc<dyn Extractor>,
    recorder: Arc<dyn TraceRecorder>,
    sink: Option<Arc<dyn EventSink>>,
    scorer: Box<dyn Scorer>,
    run: RunMetadata,
    flush_each_item: bool,
}

impl Evaluator {
    /// An evaluator scoring with [`JsonEditDistance`] and no persistence.
    pub fn new(
        extractor: Arc<dyn Extractor>,
        recorder: Arc<dyn TraceRecorder>,
        run: RunMetadata,
    ) -> Self {
        Self {
            extractor,
            recorder,
            sink: None,
            scorer: Box::new(JsonEditDistance),
            run,
            flush_each_item: false,
        }
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Also flush after every item, bounding the recorder's buffer.
    #[must_use]
    pub fn with_flush_each_item(mut self, enabled: bool) -> Self {
        self.flush_each_item = enabled;
        self
    }

    pub fn run_metadata(&self) -> &RunMetadata {
        &self.run
    }

    /// Evaluate every item of `source`, then flush the recorder.
    pub async fn run(&self, source: &dyn DatasetSource) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let items = source.load().await?;
        let total = items.len();
        tracing::info!(dataset = source.name(), items = total, "dataset loaded");

        let mut results = Vec::with_capacity(total);
        for (index, item) in items.iter().enumerate() {
            tracing::info!("item {}/{}", index + 1, total);
            let result = self.evaluate_item(index, item).await;
            results.push(result);

            if self.flush_each_item {
                if let Err(e) = self.recorder.flush().await {
                    tracing::warn!(item = %item.id, error = %e, "intermediate flush failed; events stay queued");
                }
            }
        }

        self.recorder.flush().await?;
        tracing::info!(items = total, "evaluation telemetry flushed");

        Ok(RunSummary::from_results(
            self.run.run_name.clone(),
            source.name().to_string(),
            results,
            started.elapsed(),
        ))
    }

    /// Run one item through extraction, scoring and recording.
    pub async fn evaluate_item(&self, index: usize, item: &DatasetItem) -> ItemResult {
        let post_id = item.display_id(index);
        let trace_id = self
            .recorder
            .open(TraceSpec::for_item(item, &self.run, &post_id));

        let outcome = self.extractor.invoke(item).await;
        let (status, produced, error) = match outcome {
            ExtractionOutcome::Success(value) => (ItemStatus::Extracted, value, None),
            ExtractionOutcome::ApiError { status, body } => {
                let body: String = body.chars().take(DIAGNOSTIC_BODY_LIMIT).collect();
                let diagnostic = format!("API error: {} - {}", status, body);
                tracing::warn!(
                    item = %item.id,
                    status,
                    fallback = "diagnostic string",
                    "extraction failed"
                );
                (
                    ItemStatus::ApiError,
                    Value::String(diagnostic.clone()),
                    Some(diagnostic),
                )
            }
            ExtractionOutcome::NetworkFailure { kind, message } => {
                tracing::warn!(
                    item = %item.id,
                    %kind,
                    fallback = "expected_output",
                    "extraction service unreachable"
                );
                (
                    ItemStatus::Fallback,
                    item.expected_output.clone(),
                    Some(format!("{}: {}", kind, message)),
                )
            }
        };

        let (score, scoring_error) = score_or_worst(
            self.scorer.as_ref(),
            &trace_id,
            &produced,
            &item.expected_output,
        );
        if let Some(e) = &scoring_error {
            tracing::warn!(item = %item.id, error = %e, fallback = "worst-case score", "scoring failed");
        }

        self.recorder.record_observation(
            &trace_id,
            Observation::new(item.input.clone(), produced.clone(), &post_id),
        );
        self.recorder
            .record_score(&trace_id, SCORE_NAME, score.similarity);

        tracing::info!(
            item = %item.id,
            %status,
            similarity = score.similarity,
            distance = score.distance,
            "item scored"
        );

        let persisted = match &self.sink {
            None => None,
            Some(_) if status != ItemStatus::Extracted => Some(false),
            Some(sink) => match save_results(sink.as_ref(), &produced).await {
                Ok(report) => {
                    tracing::info!(
                        item = %item.id,
                        events = report.event_ids.len(),
                        "results persisted"
                    );
                    Some(true)
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "persistence skipped");
                    Some(false)
                }
            },
        };

        ItemResult {
            item_id: item.id.clone(),
            post_id,
            trace_id,
            status,
            produced,
            similarity: score.similarity,
            distance: score.distance,
            scoring_failed: scoring_error.is_some(),
            persisted,
            error,
        }
    }
}

/// Connect to the event database, creating the schema if needed.
pub async fn open_sink(config: &DbConfig) -> anyhow::Result<SqliteSink> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::ensure_schema(&pool).await?;
    Ok(SqliteSink::new(pool))
}

/// `peval run`
pub async fn run_evaluation(
    config: &Config,
    overrides: RunOverrides,
    output: Option<PathBuf>,
) -> anyhow::Result<RunSummary> {
    let settings = config.resolve_run(overrides)?;
    let run = &settings.metadata;

    tracing::info!(
        run_name = %run.run_name,
        run_description = %run.run_description,
        evaluator_model = %run.evaluator_model,
        metrics = %run.metrics.join(", "),
        dataset = %settings.dataset,
        "starting evaluation"
    );

    let extractor = Arc::new(WorkflowClient::new(&config.workflow)?);
    let recorder: Arc<dyn TraceRecorder> = Arc::from(create_recorder(&config.tracking)?);
    let source = open_source(&settings.dataset, config)?;

    let mut evaluator = Evaluator::new(extractor, recorder, settings.metadata.clone())
        .with_flush_each_item(settings.flush_each_item);

    if settings.save_to_db {
        match open_sink(&config.db).await {
            Ok(sink) => evaluator = evaluator.with_sink(Arc::new(sink)),
            Err(e) => tracing::warn!(
                path = %config.db.path.display(),
                error = %e,
                "could not open event database; persistence disabled for this run"
            ),
        }
    }

    let summary = evaluator.run(source.as_ref()).await?;
    summary.print_summary();

    if let Some(path) = output {
        summary.write_json(&path)?;
        println!("Summary written to {}", path.display());
    }

    Ok(summary)
}

/// `peval extract`: one ad-hoc call to the extraction service.
pub async fn run_extract(
    config: &Config,
    caption: &str,
    date: Option<&str>,
    image: Option<&str>,
) -> anyhow::Result<()> {
    let client = WorkflowClient::new(&config.workflow)?;

    let mut input = json!({
        "caption": caption,
        "date": date.unwrap_or(""),
    });
    if let Some(path) = image {
        input["image_path"] = json!(path);
    }
    let item = DatasetItem::new("adhoc", input, Value::Null);

    match client.invoke(&item).await {
        ExtractionOutcome::Success(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        ExtractionOutcome::ApiError { status, body } => {
            anyhow::bail!("API error: {} - {}", status, body)
        }
        ExtractionOutcome::NetworkFailure { kind, message } => {
            anyhow::bail!("extraction service unreachable ({}): {}", kind, message)
        }
    }
}
