//! Structural similarity between produced and expected outputs.
//!
//! Provides the [`Scorer`] trait and [`JsonEditDistance`], the metric behind
//! the `"distancia JSON"` run option: both values are serialized to compact
//! JSON with sorted object keys and compared with a normalized
//! Damerau-Levenshtein (optimal string alignment) distance over characters.
//!
//! OSA never edits a substring twice, so it can exceed the unrestricted
//! Damerau-Levenshtein distance (`"ca"` vs `"abc"` is 3 here, 2 unrestricted).
//! Scores are therefore not exactly comparable with tools that use the
//! unrestricted metric.

use serde_json::{Map, Value};

use crate::error::ScoringError;
use crate::models::ScoreRecord;

/// Metric name accepted in `run.metrics` / `--metrics`.
pub const JSON_DISTANCE_METRIC: &str = "distancia JSON";

/// All metric names understood by [`JsonEditDistance`].
pub const KNOWN_METRICS: &[&str] = &[JSON_DISTANCE_METRIC, "json_distance"];

pub fn is_known_metric(name: &str) -> bool {
    KNOWN_METRICS.iter().any(|m| m.eq_ignore_ascii_case(name.trim()))
}

/// Trait for output scorers.
///
/// A scorer compares a produced value against the expected one and returns
/// a distance in `[0, 1]`: `0.0` for identical content, `1.0` for nothing in
/// common. Similarity is always `1 - distance`.
pub trait Scorer: Send + Sync {
    /// The name of this scorer (used in reports).
    fn name(&self) -> &str;

    fn distance(&self, produced: &Value, expected: &Value) -> Result<f64, ScoringError>;
}

/// Normalized edit distance over canonical JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEditDistance;

impl Scorer for JsonEditDistance {
    fn name(&self) -> &str {
        "json_distance"
    }

    fn distance(&self, produced: &Value, expected: &Value) -> Result<f64, ScoringError> {
        let a = canonical_json(produced)?;
        let b = canonical_json(expected)?;
        Ok(normalized_osa_distance(&a, &b))
    }
}

/// Score `produced` against `expected`, substituting the worst-case record
/// when the scorer fails. The error, if any, is handed back for reporting.
pub fn score_or_worst(
    scorer: &dyn Scorer,
    trace_id: &str,
    produced: &Value,
    expected: &Value,
) -> (ScoreRecord, Option<ScoringError>) {
    match scorer.distance(produced, expected) {
        Ok(distance) => (ScoreRecord::from_distance(trace_id, distance), None),
        Err(e) => (ScoreRecord::worst(trace_id), Some(e)),
    }
}

/// Compact JSON with object keys sorted recursively, so that key order in
/// either value never affects the score.
pub fn canonical_json(value: &Value) -> Result<String, ScoringError> {
    Ok(serde_json::to_string(&sort_keys(value))?)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// `osa_distance(a, b) / max(len(a), len(b))`, with two empty strings at 0.
pub fn normalized_osa_distance(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    osa_distance(&a, &b) as f64 / longest as f64
}

/// Optimal string alignment distance: insertions, deletions, substitutions
/// and transpositions of adjacent characters, each costing 1.
fn osa_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let width = b.len() + 1;
    let mut prev_prev = vec![0usize; width];
    let mut prev: Vec<usize> = (0..width).collect();
    let mut curr = vec![0usize; width];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(prev_prev[j - 2] + 1);
            }
            curr[j] = best;
        }
        std::mem::swap(&mut prev_prev, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_values_score_zero() {
        let v = json!({"artistas": ["javierturnes"], "fecha": ["2024-04-12"], "ubicacion": ["Riquela Club"]});
        assert_eq!(JsonEditDistance.distance(&v, &v).unwrap(), 0.0);
    }

    #[test]
    fn test_key_order_ignored() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(JsonEditDistance.distance(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_bounded() {
        let pairs = [
            (json!("API error: 500 - boom"), json!({"artistas": ["x"]})),
            (json!(null), json!({"artistas": []})),
            (json!([1, 2, 3]), json!([3, 2, 1])),
            (json!(""), json!("completely different")),
        ];
        for (a, b) in pairs {
            let d = JsonEditDistance.distance(&a, &b).unwrap();
            assert!((0.0..=1.0).contains(&d), "distance {} out of range", d);
        }
    }

    #[test]
    fn test_partial_match_between_bounds() {
        let a = json!({"artistas": ["insaniam", "nodropforus"]});
        let b = json!({"artistas": ["insaniam", "frequency"]});
        let d = JsonEditDistance.distance(&a, &b).unwrap();
        assert!(d > 0.0 && d < 1.0);
    }

    #[test]
    fn test_osa_distance() {
        let d = |a: &str, b: &str| {
            osa_distance(
                &a.chars().collect::<Vec<_>>(),
                &b.chars().collect::<Vec<_>>(),
            )
        };
        assert_eq!(d("", ""), 0);
        assert_eq!(d("abc", ""), 3);
        assert_eq!(d("kitten", "sitting"), 3);
        assert_eq!(d("ab", "ba"), 1);
        assert_eq!(d("ca", "abc"), 3);
        assert_eq!(d("Coruña", "Coruna"), 1);
    }

    #[test]
    fn test_normalized_distance() {
        assert_eq!(normalized_osa_distance("", ""), 0.0);
        assert_eq!(normalized_osa_distance("abcd", "abcd"), 0.0);
        assert_eq!(normalized_osa_distance("abcd", "abce"), 0.25);
        assert_eq!(normalized_osa_distance("ab", "xyzw"), 1.0);
    }

    #[test]
    fn test_canonical_json_is_compact_and_sorted() {
        let v: Value = serde_json::from_str(r#"{ "z": [1, {"b": 2, "a": 1}], "a": "ñ" }"#).unwrap();
        assert_eq!(canonical_json(&v).unwrap(), r#"{"a":"ñ","z":[1,{"a":1,"b":2}]}"#);
    }

    struct BrokenScorer;

    impl Scorer for BrokenScorer {
        fn name(&self) -> &str {
            "broken"
        }

        fn distance(&self, _: &Value, _: &Value) -> Result<f64, ScoringError> {
            let err = serde_json::from_str::<Value>("{").unwrap_err();
            Err(ScoringError::Serialize(err))
        }
    }

    #[test]
    fn test_score_or_worst() {
        let v = json!({"artistas": ["x"]});
        let (record, err) = score_or_worst(&JsonEditDistance, "t-1", &v, &v);
        assert!(err.is_none());
        assert_eq!(record.similarity, 1.0);
        assert_eq!(record.distance, 0.0);

        let (record, err) = score_or_worst(&BrokenScorer, "t-2", &v, &v);
        assert!(err.is_some());
        assert_eq!(record.trace_id, "t-2");
        assert_eq!(record.similarity, 0.0);
        assert_eq!(record.distance, 1.0);
    }

    #[test]
    fn test_known_metrics() {
        assert!(is_known_metric("distancia JSON"));
        assert!(is_known_metric(" json_distance "));
        assert!(!is_known_metric("faithfulness"));
    }
}
