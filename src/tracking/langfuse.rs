//! Langfuse client and buffered trace recorder.
//!
//! Traces, observations and scores are queued locally as ingestion events
//! and delivered by [`LangfuseRecorder::flush`] through
//! `POST /api/public/ingestion`, `tracking.batch_size` events per request.
//! Requests authenticate with HTTP basic auth (`public_key:secret_key`).
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, …, capped at 2^5)
//! - HTTP 4xx (not 429) → fail immediately
//! - Network errors → retry
//! - A 207 response listing per-event errors → [`FlushError::Rejected`]
//!
//! A failed flush keeps the failed batch and every later one queued, so the
//! next flush retries them.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Observation, TraceRecorder, TraceSpec};
use crate::config::TrackingConfig;
use crate::error::FlushError;

/// Thin HTTP client for the Langfuse public API.
#[derive(Clone)]
pub struct LangfuseClient {
    http: reqwest::Client,
    host: String,
    public_key: String,
    secret_key: String,
}

impl LangfuseClient {
    pub fn new(config: &TrackingConfig) -> Result<Self> {
        let (public_key, secret_key) = config.credentials()?;
        Self::with_credentials(config, public_key, secret_key)
    }

    pub fn with_credentials(
        config: &TrackingConfig,
        public_key: String,
        secret_key: String,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            public_key,
            secret_key,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send one ingestion batch. Returns the status code and parsed body.
    async fn ingest(&self, batch: &[Value]) -> Result<(u16, Value), reqwest::Error> {
        let response = self
            .http
            .post(format!("{}/api/public/ingestion", self.host))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }

    /// Fetch one page of a dataset's items.
    pub async fn dataset_items_page(&self, dataset: &str, page: u32, limit: u32) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/api/public/dataset-items", self.host))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .query(&[
                ("datasetName", dataset.to_string()),
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Langfuse API error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Wrap an event body in the ingestion envelope.
fn envelope(event_type: &str, body: Value) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "timestamp": now_rfc3339(),
        "type": event_type,
        "body": body,
    })
}

pub fn trace_event(trace_id: &str, spec: &TraceSpec) -> Value {
    envelope(
        "trace-create",
        json!({
            "id": trace_id,
            "timestamp": now_rfc3339(),
            "name": spec.name,
            "userId": spec.user_id,
            "metadata": spec.metadata,
            "tags": spec.tags,
        }),
    )
}

pub fn observation_event(trace_id: &str, observation: &Observation) -> Value {
    let now = now_rfc3339();
    envelope(
        "span-create",
        json!({
            "id": Uuid::new_v4().to_string(),
            "traceId": trace_id,
            "name": observation.name,
            "startTime": now,
            "endTime": now,
            "input": observation.input,
            "output": observation.output,
            "metadata": observation.metadata,
        }),
    )
}

pub fn score_event(trace_id: &str, name: &str, value: f64) -> Value {
    envelope(
        "score-create",
        json!({
            "id": Uuid::new_v4().to_string(),
            "traceId": trace_id,
            "name": name,
            "value": value,
            "dataType": "NUMERIC",
        }),
    )
}

/// Per-event errors reported in a 207 Multi-Status body.
fn rejected_events(body: &Value) -> Vec<String> {
    body.get("errors")
        .and_then(|e| e.as_array())
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    let id = e.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                    let message = e
                        .get("message")
                        .or_else(|| e.get("error"))
                        .map(|m| m.to_string())
                        .unwrap_or_default();
                    format!("{}: {}", id, message)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Buffered [`TraceRecorder`] backed by Langfuse.
pub struct LangfuseRecorder {
    client: LangfuseClient,
    queue: Mutex<Vec<Value>>,
    batch_size: usize,
    max_retries: u32,
}

impl LangfuseRecorder {
    pub fn new(client: LangfuseClient, config: &TrackingConfig) -> Self {
        Self {
            client,
            queue: Mutex::new(Vec::new()),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        }
    }

    fn queue(&self) -> MutexGuard<'_, Vec<Value>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of events waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Put undelivered events back ahead of anything queued since the flush began.
    fn requeue(&self, unsent: &[Value]) {
        let mut queue = self.queue();
        queue.splice(0..0, unsent.iter().cloned());
        tracing::warn!(events = unsent.len(), "telemetry kept for the next flush");
    }

    async fn send_batch(&self, batch: &[Value]) -> Result<(), FlushError> {
        let mut last_err = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.ingest(batch).await {
                Ok((status, body)) if (200..300).contains(&status) => {
                    let rejected = rejected_events(&body);
                    if rejected.is_empty() {
                        return Ok(());
                    }
                    return Err(FlushError::Rejected {
                        count: rejected.len(),
                        detail: rejected.join("; "),
                    });
                }
                Ok((status, body)) if status == 429 || status >= 500 => {
                    last_err = format!("HTTP {}: {}", status, body);
                    tracing::warn!(status, attempt, "Langfuse ingestion failed, retrying");
                }
                Ok((status, body)) => {
                    return Err(FlushError::Rejected {
                        count: batch.len(),
                        detail: format!("HTTP {}: {}", status, body),
                    });
                }
                Err(e) => {
                    last_err = e.to_string();
                    tracing::warn!(error = %e, attempt, "Langfuse unreachable, retrying");
                }
            }
        }

        Err(FlushError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_err,
        })
    }
}

#[async_trait]
impl TraceRecorder for LangfuseRecorder {
    fn open(&self, spec: TraceSpec) -> String {
        let trace_id = Uuid::new_v4().to_string();
        let event = trace_event(&trace_id, &spec);
        self.queue().push(event);
        trace_id
    }

    fn record_observation(&self, trace_id: &str, observation: Observation) {
        let event = observation_event(trace_id, &observation);
        self.queue().push(event);
    }

    fn record_score(&self, trace_id: &str, name: &str, value: f64) {
        let event = score_event(trace_id, name, value);
        self.queue().push(event);
    }

    async fn flush(&self) -> Result<(), FlushError> {
        let events = std::mem::take(&mut *self.queue());
        if events.is_empty() {
            return Ok(());
        }

        let total = events.len();
        let mut sent = 0;
        for batch in events.chunks(self.batch_size) {
            if let Err(e) = self.send_batch(batch).await {
                self.requeue(&events[sent..]);
                return Err(e);
            }
            sent += batch.len();
        }

        tracing::info!(events = total, host = %self.client.host(), "telemetry flushed");
        Ok(())
    }
}
