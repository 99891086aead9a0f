//! Per-item results and the run summary.
//!
//! Every dataset item yields exactly one [`ItemResult`]. The summary keeps
//! the three ways an item can end apart, so genuinely low scores are not
//! confused with network-outage artifacts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// How the produced value for an item was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// The extraction service answered and its output was scored.
    Extracted,
    /// The service answered with an error; a diagnostic string was scored.
    ApiError,
    /// No response; `expected_output` was scored against itself.
    Fallback,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemStatus::Extracted => "extracted",
            ItemStatus::ApiError => "api_error",
            ItemStatus::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: String,
    pub post_id: Value,
    pub trace_id: String,
    pub status: ItemStatus,
    /// The value that was scored.
    pub produced: Value,
    pub similarity: f64,
    pub distance: f64,
    /// The scorer failed and the worst-case score was substituted.
    pub scoring_failed: bool,
    /// `None` when persistence is disabled for the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
    /// Description of the absorbed error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of an entire evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_name: String,
    pub dataset_name: String,
    pub total_items: usize,
    pub extracted: usize,
    pub api_errors: usize,
    pub fallbacks: usize,
    pub scoring_failures: usize,
    /// Mean similarity over all items, fallbacks included.
    pub mean_similarity: f64,
    /// Mean similarity over extracted items only.
    pub mean_similarity_extracted: Option<f64>,
    pub results: Vec<ItemResult>,
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

impl RunSummary {
    pub fn from_results(
        run_name: String,
        dataset_name: String,
        results: Vec<ItemResult>,
        total_duration: Duration,
    ) -> Self {
        let count = |status: ItemStatus| results.iter().filter(|r| r.status == status).count();
        let extracted = count(ItemStatus::Extracted);
        let api_errors = count(ItemStatus::ApiError);
        let fallbacks = count(ItemStatus::Fallback);
        let scoring_failures = results.iter().filter(|r| r.scoring_failed).count();

        let mean_similarity = mean(results.iter().map(|r| &r.similarity)).unwrap_or(0.0);
        let mean_similarity_extracted = mean(
            results
                .iter()
                .filter(|r| r.status == ItemStatus::Extracted)
                .map(|r| &r.similarity),
        );

        Self {
            run_name,
            dataset_name,
            total_items: results.len(),
            extracted,
            api_errors,
            fallbacks,
            scoring_failures,
            mean_similarity,
            mean_similarity_extracted,
            results,
            total_duration,
        }
    }

    /// Print a summary to stdout.
    pub fn print_summary(&self) {
        println!();
        println!("=== Evaluation Summary ===");
        println!("Run: {}", self.run_name);
        println!("Dataset: {}", self.dataset_name);
        println!();
        println!("{:<16} {:<12} {:>10}  TRACE", "ITEM", "STATUS", "SIMILARITY");
        for r in &self.results {
            println!(
                "{:<16} {:<12} {:>10.3}  {}",
                r.item_id, r.status, r.similarity, r.trace_id
            );
        }
        println!();
        println!(
            "Items: {} total, {} extracted, {} api error(s), {} fallback(s)",
            self.total_items, self.extracted, self.api_errors, self.fallbacks
        );
        if self.scoring_failures > 0 {
            println!("Scoring failures: {}", self.scoring_failures);
        }
        println!("Mean similarity: {:.3}", self.mean_similarity);
        if let Some(m) = self.mean_similarity_extracted {
            println!("Mean similarity (extracted only): {:.3}", m);
        }
        if self.fallbacks > 0 {
            println!(
                "WARNING: {} fallback item(s) scored expected_output against itself; their similarity of 1.0 is artificial.",
                self.fallbacks
            );
        }
        println!("Duration: {:.1}s", self.total_duration.as_secs_f64());
    }

    /// Write the summary to a JSON file.
    pub fn write_json(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary: {}", path.display()))
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, status: ItemStatus, similarity: f64) -> ItemResult {
        ItemResult {
            item_id: id.to_string(),
            post_id: json!(0),
            trace_id: format!("trace-{}", id),
            status,
            produced: json!({}),
            similarity,
            distance: 1.0 - similarity,
            scoring_failed: false,
            persisted: None,
            error: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary::from_results(
            "run".to_string(),
            "dataset.csv".to_string(),
            vec![
                result("1", ItemStatus::Extracted, 0.5),
                result("2", ItemStatus::Fallback, 1.0),
                result("3", ItemStatus::ApiError, 0.0),
                result("4", ItemStatus::Extracted, 1.0),
            ],
            Duration::from_secs(2),
        );
        assert_eq!(summary.total_items, 4);
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.fallbacks, 1);
        assert_eq!(summary.api_errors, 1);
        assert_eq!(summary.mean_similarity, 0.625);
        assert_eq!(summary.mean_similarity_extracted, Some(0.75));
    }

    #[test]
    fn test_empty_summary() {
        let summary = RunSummary::from_results(
            "run".to_string(),
            "empty".to_string(),
            vec![],
            Duration::from_secs(0),
        );
        assert_eq!(summary.total_items, 0);
        assert_eq!(summary.mean_similarity, 0.0);
        assert_eq!(summary.mean_similarity_extracted, None);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = RunSummary::from_results(
            "run".to_string(),
            "d".to_string(),
            vec![result("1", ItemStatus::Fallback, 1.0)],
            Duration::from_secs(5),
        );
        summary.write_json(&path).unwrap();

        let parsed: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.fallbacks, 1);
        assert_eq!(parsed.results[0].status, ItemStatus::Fallback);
        assert_eq!(parsed.total_duration.as_secs(), 5);
    }

    #[test]
    fn test_write_json_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("summary.json");
        let summary = RunSummary::from_results("run".to_string(), "d".to_string(), vec![], Duration::ZERO);

        let err = summary.write_json(&path).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to write summary"), "{}", message);
        assert!(message.contains("missing"));
    }
}
