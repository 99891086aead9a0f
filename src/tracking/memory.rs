//! In-memory [`TraceRecorder`] for tests and dry runs.
//!
//! Keeps every trace, observation and score in insertion order behind a
//! `Mutex`, and counts flushes.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Observation, TraceRecorder, TraceSpec};
use crate::error::FlushError;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTrace {
    pub id: String,
    pub spec: TraceSpec,
    pub observations: Vec<Observation>,
    pub scores: Vec<(String, f64)>,
}

#[derive(Debug, Default)]
struct State {
    traces: Vec<RecordedTrace>,
    flushes: usize,
    fail_flush: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    state: Mutex<State>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose every flush reports rejected events.
    pub fn failing() -> Self {
        let recorder = Self::default();
        recorder.lock().fail_flush = true;
        recorder
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn traces(&self) -> Vec<RecordedTrace> {
        self.lock().traces.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// Every `(trace_id, name, value)` score, in recording order.
    pub fn scores(&self) -> Vec<(String, String, f64)> {
        self.lock()
            .traces
            .iter()
            .flat_map(|t| {
                t.scores
                    .iter()
                    .map(move |(name, value)| (t.id.clone(), name.clone(), *value))
            })
            .collect()
    }
}

#[async_trait]
impl TraceRecorder for InMemoryRecorder {
    fn open(&self, spec: TraceSpec) -> String {
        let mut state = self.lock();
        let id = format!("trace-{}", state.traces.len() + 1);
        state.traces.push(RecordedTrace {
            id: id.clone(),
            spec,
            observations: Vec::new(),
            scores: Vec::new(),
        });
        id
    }

    fn record_observation(&self, trace_id: &str, observation: Observation) {
        if let Some(trace) = self.lock().traces.iter_mut().find(|t| t.id == trace_id) {
            trace.observations.push(observation);
        }
    }

    fn record_score(&self, trace_id: &str, name: &str, value: f64) {
        if let Some(trace) = self.lock().traces.iter_mut().find(|t| t.id == trace_id) {
            trace.scores.push((name.to_string(), value));
        }
    }

    async fn flush(&self) -> Result<(), FlushError> {
        let mut state = self.lock();
        state.flushes += 1;
        if state.fail_flush {
            let count = state.traces.len();
            return Err(FlushError::Rejected {
                count,
                detail: "in-memory recorder configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn spec(user: &str) -> TraceSpec {
        TraceSpec {
            name: "run".to_string(),
            user_id: user.to_string(),
            metadata: Map::new(),
            tags: vec!["evaluation".to_string()],
        }
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let recorder = InMemoryRecorder::new();
        let a = recorder.open(spec("item_a"));
        let b = recorder.open(spec("item_b"));
        recorder.record_observation(&a, Observation::new(json!(1), json!(2), &json!(0)));
        recorder.record_score(&b, "Similarity", 0.5);
        recorder.record_score(&a, "Similarity", 1.0);
        recorder.flush().await.unwrap();

        let traces = recorder.traces();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].observations.len(), 1);
        assert_eq!(traces[1].observations.len(), 0);
        assert_eq!(
            recorder.scores(),
            vec![
                (a.clone(), "Similarity".to_string(), 1.0),
                (b.clone(), "Similarity".to_string(), 0.5)
            ]
        );
        assert_eq!(recorder.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_flush() {
        let recorder = InMemoryRecorder::failing();
        recorder.open(spec("x"));
        assert!(matches!(
            recorder.flush().await,
            Err(FlushError::Rejected { count: 1, .. })
        ));
        assert_eq!(recorder.flush_count(), 1);
    }
}
