//! Extraction workflow client and response normalization.
//!
//! Every call to the extraction service ends in exactly one
//! [`ExtractionOutcome`]; nothing raised by the transport or by response
//! parsing escapes [`Extractor::invoke`].
//!
//! # Request
//!
//! A post object (`{"caption", "date", "image_path"?}`) becomes
//! `{"post": caption, "date": date}`. Any other input shape is sent with
//! empty fields: the service is still called.
//!
//! ```json
//! { "inputs": { "post": "...", "date": "..." }, "response_mode": "blocking", "user": "Langfuse" }
//! ```
//!
//! # Response resolution
//!
//! On HTTP 200 the payload sits under `data.outputs`. The canonical output is
//! the first hit of [`RESOLUTION_STRATEGIES`], tried in order:
//!
//! | Strategy | Rule |
//! |----------|------|
//! | `result` | `outputs.result` |
//! | `structured_fields` | `outputs` itself, when it carries `artistas` |
//! | `first_key` | value under the lexicographically first key (degraded) |
//!
//! An empty `outputs` object yields a diagnostic string rather than a failure.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::error::Error as _;
use std::time::Duration;

use crate::config::WorkflowConfig;
use crate::models::{DatasetItem, ExtractionOutcome, ExtractionRequest, NetworkFailureKind};

/// Maximum number of characters of an error body kept in an outcome.
const ERROR_BODY_LIMIT: usize = 200;

/// Anything that can turn a dataset item into an extraction outcome.
///
/// The HTTP implementation is [`WorkflowClient`]; tests substitute fakes.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn invoke(&self, item: &DatasetItem) -> ExtractionOutcome;
}

/// Build the workflow inputs from a dataset item's `input`.
pub fn build_request(input: &Value) -> ExtractionRequest {
    let Some(post) = input.as_object().filter(|o| o.contains_key("caption")) else {
        return ExtractionRequest::default();
    };

    let has_image = post
        .get("image_path")
        .map(|p| !p.is_null() && p.as_str() != Some(""))
        .unwrap_or(false);

    ExtractionRequest {
        post: field_as_text(post.get("caption")),
        date: field_as_text(post.get("date")),
        has_image,
    }
}

fn field_as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A named rule that tries to pull the canonical output out of `outputs`.
pub struct ResolutionStrategy {
    pub name: &'static str,
    pub apply: fn(&Map<String, Value>) -> Option<Value>,
}

pub const RESOLUTION_STRATEGIES: &[ResolutionStrategy] = &[
    ResolutionStrategy {
        name: "result",
        apply: nested_result,
    },
    ResolutionStrategy {
        name: "structured_fields",
        apply: structured_fields,
    },
    ResolutionStrategy {
        name: "first_key",
        apply: first_key,
    },
];

fn nested_result(outputs: &Map<String, Value>) -> Option<Value> {
    outputs.get("result").cloned()
}

fn structured_fields(outputs: &Map<String, Value>) -> Option<Value> {
    outputs
        .contains_key("artistas")
        .then(|| Value::Object(outputs.clone()))
}

fn first_key(outputs: &Map<String, Value>) -> Option<Value> {
    outputs
        .keys()
        .min()
        .and_then(|key| outputs.get(key))
        .cloned()
}

/// Apply [`RESOLUTION_STRATEGIES`] in order.
///
/// Returns the winning strategy name with its value, or `None` when
/// `outputs` has no keys at all.
pub fn resolve_outputs(outputs: &Map<String, Value>) -> Option<(&'static str, Value)> {
    RESOLUTION_STRATEGIES
        .iter()
        .find_map(|s| (s.apply)(outputs).map(|v| (s.name, v)))
}

/// Turn the body of an HTTP 200 response into an outcome.
pub fn normalize_response(body: &str) -> ExtractionOutcome {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return processing_error(format!("invalid JSON: {}", e)),
    };

    let Some(data) = parsed.get("data") else {
        return processing_error("missing 'data'".to_string());
    };
    let Some(outputs) = data.get("outputs") else {
        return processing_error("missing 'data.outputs'".to_string());
    };
    let Some(outputs) = outputs.as_object() else {
        return processing_error("'data.outputs' is not an object".to_string());
    };

    match resolve_outputs(outputs) {
        Some((strategy, value)) => {
            if strategy == "first_key" {
                let keys: Vec<&String> = outputs.keys().collect();
                tracing::warn!(?keys, "no expected key in workflow outputs, using first key");
            } else {
                tracing::debug!(strategy, "resolved workflow outputs");
            }
            ExtractionOutcome::Success(value)
        }
        None => ExtractionOutcome::Success(Value::String(format!(
            "No response keys found in the output: {}",
            data
        ))),
    }
}

fn processing_error(detail: String) -> ExtractionOutcome {
    tracing::warn!(%detail, "could not process workflow response");
    ExtractionOutcome::ApiError {
        status: 200,
        body: format!("Error processing response: {}", detail),
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Map a transport error onto the outcome taxonomy.
pub fn classify_network_error(err: &reqwest::Error) -> NetworkFailureKind {
    if err.is_timeout() {
        return NetworkFailureKind::Timeout;
    }
    if err.is_connect() {
        let mut source = err.source();
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        return NetworkFailureKind::ConnectionRefused
                    }
                    std::io::ErrorKind::TimedOut => return NetworkFailureKind::Timeout,
                    _ => {}
                }
            }
            source = inner.source();
        }
    }
    NetworkFailureKind::Other
}

/// HTTP client for the extraction workflow endpoint.
///
/// One blocking-mode POST per item, bearer-token auth, bounded by
/// `workflow.timeout_secs`. No retries.
pub struct WorkflowClient {
    http: reqwest::Client,
    url: String,
    user: String,
    api_key: Option<String>,
}

impl WorkflowClient {
    pub fn new(config: &WorkflowConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "workflow API key not set; requests will be sent without Authorization"
            );
        }

        Ok(Self {
            http,
            url: config.url.clone(),
            user: config.user.clone(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and normalize whatever comes back.
    pub async fn send(&self, request: &ExtractionRequest) -> ExtractionOutcome {
        let body = json!({
            "inputs": request,
            "response_mode": "blocking",
            "user": self.user,
        });
        tracing::debug!(url = %self.url, payload = %body, "calling extraction workflow");

        let mut builder = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return network_failure(&e),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return network_failure(&e),
        };

        if status.as_u16() != 200 {
            tracing::warn!(status = status.as_u16(), "extraction workflow returned an error");
            return ExtractionOutcome::ApiError {
                status: status.as_u16(),
                body: truncate_chars(&text, ERROR_BODY_LIMIT),
            };
        }

        tracing::debug!(body = %text, "extraction workflow response");
        normalize_response(&text)
    }
}

fn network_failure(err: &reqwest::Error) -> ExtractionOutcome {
    let kind = classify_network_error(err);
    tracing::warn!(%kind, error = %err, "extraction workflow unreachable");
    ExtractionOutcome::NetworkFailure {
        kind,
        message: err.to_string(),
    }
}

#[async_trait]
impl Extractor for WorkflowClient {
    async fn invoke(&self, item: &DatasetItem) -> ExtractionOutcome {
        let request = build_request(&item.input);
        if request.has_image {
            tracing::debug!(item = %item.id, "post has an image (not uploaded)");
        }
        if request.post.is_empty() {
            tracing::debug!(item = %item.id, "input is not a post object; sending empty fields");
        }
        self.send(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_build_request_from_post() {
        let req = build_request(&json!({
            "id": "post_456",
            "caption": "Este viernes 10.05.25 tenemos a @insaniam",
            "date": "2024-05-05",
            "image_path": "img/post_456.jpg"
        }));
        assert_eq!(req.post, "Este viernes 10.05.25 tenemos a @insaniam");
        assert_eq!(req.date, "2024-05-05");
        assert!(req.has_image);
    }

    #[test]
    fn test_build_request_missing_date() {
        let req = build_request(&json!({"caption": "hola"}));
        assert_eq!(req.post, "hola");
        assert_eq!(req.date, "");
        assert!(!req.has_image);
    }

    #[test]
    fn test_build_request_other_shapes_are_empty() {
        for input in [json!("just text"), json!({"text": "no caption"}), json!(null), json!([1])] {
            assert_eq!(build_request(&input), ExtractionRequest::default());
        }
    }

    #[test]
    fn test_request_serializes_without_image_flag() {
        let req = build_request(&json!({"caption": "c", "date": "d", "image_path": "x.jpg"}));
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"post": "c", "date": "d"}));
    }

    #[test]
    fn test_resolve_nested_result() {
        let out = outputs(json!({"result": {"artistas": ["x"]}}));
        assert_eq!(resolve_outputs(&out), Some(("result", json!({"artistas": ["x"]}))));
    }

    #[test]
    fn test_resolve_result_wins_over_fields() {
        let out = outputs(json!({"artistas": ["a"], "result": "r"}));
        assert_eq!(resolve_outputs(&out).unwrap().1, json!("r"));
    }

    #[test]
    fn test_resolve_structured_fields() {
        let out = outputs(json!({"artistas": ["y"], "fecha": ["2024-01-01"]}));
        assert_eq!(
            resolve_outputs(&out),
            Some((
                "structured_fields",
                json!({"artistas": ["y"], "fecha": ["2024-01-01"]})
            ))
        );
    }

    #[test]
    fn test_resolve_first_key() {
        let out = outputs(json!({"foo": "bar"}));
        assert_eq!(resolve_outputs(&out), Some(("first_key", json!("bar"))));
    }

    #[test]
    fn test_resolve_empty() {
        assert_eq!(resolve_outputs(&Map::new()), None);
    }

    #[test]
    fn test_normalize_success() {
        let body = r#"{"workflow_run_id": "w1", "data": {"id": "w1", "outputs": {"result": {"artistas": ["x"]}}}}"#;
        assert_eq!(
            normalize_response(body),
            ExtractionOutcome::Success(json!({"artistas": ["x"]}))
        );
    }

    #[test]
    fn test_normalize_empty_outputs_is_diagnostic_success() {
        let outcome = normalize_response(r#"{"data": {"outputs": {}}}"#);
        match outcome {
            ExtractionOutcome::Success(Value::String(s)) => {
                assert!(s.starts_with("No response keys found in the output"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_malformed_bodies() {
        for body in [
            "not json",
            r#"{"error": "x"}"#,
            r#"{"data": {}}"#,
            r#"{"data": {"outputs": "text"}}"#,
        ] {
            match normalize_response(body) {
                ExtractionOutcome::ApiError { status, body } => {
                    assert_eq!(status, 200);
                    assert!(body.starts_with("Error processing response"));
                }
                other => panic!("unexpected outcome for {}: {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let s = "ñ".repeat(300);
        assert_eq!(truncate_chars(&s, ERROR_BODY_LIMIT).chars().count(), 200);
    }
}
