//! TOML configuration for `peval`.
//!
//! Every section is optional. Secrets never live in the file: the config only
//! names the environment variables that carry them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::RunMetadata;
use crate::scorer;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub db: DbConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunConfig {
    pub evaluator_model: String,
    /// Empty means "generate from the current timestamp".
    pub run_name: String,
    pub run_description: String,
    pub metrics: Vec<String>,
    pub dataset: String,
    pub save_to_db: bool,
    pub flush_each_item: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            evaluator_model: "gemma3:27b".to_string(),
            run_name: String::new(),
            run_description: "evaluacion posts redes sociales".to_string(),
            metrics: vec![scorer::JSON_DISTANCE_METRIC.to_string()],
            dataset: "dataset.csv".to_string(),
            save_to_db: false,
            flush_each_item: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_url")]
    pub url: String,
    #[serde(default = "default_workflow_user")]
    pub user: String,
    #[serde(default = "default_workflow_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_workflow_api_key_env")]
    pub api_key_env: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            url: default_workflow_url(),
            user: default_workflow_user(),
            timeout_secs: default_workflow_timeout_secs(),
            api_key_env: default_workflow_api_key_env(),
        }
    }
}

fn default_workflow_url() -> String {
    "http://localhost:8080/v1/workflows/run".to_string()
}
fn default_workflow_user() -> String {
    "Langfuse".to_string()
}
fn default_workflow_timeout_secs() -> u64 {
    10
}
fn default_workflow_api_key_env() -> String {
    "DIFY_API_KEY".to_string()
}

impl WorkflowConfig {
    /// Bearer token for the workflow endpoint, if the named variable is set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    #[serde(default = "default_tracking_provider")]
    pub provider: String,
    #[serde(default = "default_tracking_host")]
    pub host: String,
    #[serde(default = "default_public_key_env")]
    pub public_key_env: String,
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_tracking_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            provider: default_tracking_provider(),
            host: default_tracking_host(),
            public_key_env: default_public_key_env(),
            secret_key_env: default_secret_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_tracking_timeout_secs(),
        }
    }
}

fn default_tracking_provider() -> String {
    "langfuse".to_string()
}
fn default_tracking_host() -> String {
    "http://localhost:3000".to_string()
}
fn default_public_key_env() -> String {
    "LANGFUSE_PUBLIC_KEY".to_string()
}
fn default_secret_key_env() -> String {
    "LANGFUSE_SECRET_KEY".to_string()
}
fn default_batch_size() -> usize {
    50
}
fn default_max_retries() -> u32 {
    3
}
fn default_tracking_timeout_secs() -> u64 {
    30
}

impl TrackingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Langfuse `(public_key, secret_key)` read from the environment.
    pub fn credentials(&self) -> Result<(String, String)> {
        let public = std::env::var(&self.public_key_env)
            .with_context(|| format!("{} environment variable not set", self.public_key_env))?;
        let secret = std::env::var(&self.secret_key_env)
            .with_context(|| format!("{} environment variable not set", self.secret_key_env))?;
        Ok((public, secret))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/peval.sqlite")
}

/// Run parameters given on the command line. `None` keeps the config value.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub evaluator_model: Option<String>,
    pub run_name: Option<String>,
    pub run_description: Option<String>,
    pub metrics: Option<String>,
    pub dataset: Option<String>,
    pub save_to_db: bool,
    pub flush_each_item: bool,
}

/// Fully resolved parameters for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub metadata: RunMetadata,
    pub dataset: String,
    pub save_to_db: bool,
    pub flush_each_item: bool,
}

impl Config {
    /// Merge CLI overrides over the `[run]` section and fill generated defaults.
    pub fn resolve_run(&self, overrides: RunOverrides) -> Result<RunSettings> {
        let run = &self.run;

        let metrics = match overrides.metrics {
            Some(list) => parse_metric_list(&list),
            None => run.metrics.clone(),
        };
        validate_metrics(&metrics)?;

        let run_name = overrides
            .run_name
            .or_else(|| Some(run.run_name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(default_run_name);

        Ok(RunSettings {
            metadata: RunMetadata {
                run_name,
                run_description: overrides
                    .run_description
                    .unwrap_or_else(|| run.run_description.clone()),
                evaluator_model: overrides
                    .evaluator_model
                    .unwrap_or_else(|| run.evaluator_model.clone()),
                metrics,
            },
            dataset: overrides.dataset.unwrap_or_else(|| run.dataset.clone()),
            save_to_db: overrides.save_to_db || run.save_to_db,
            flush_each_item: overrides.flush_each_item || run.flush_each_item,
        })
    }
}

/// `posts-eval-<dd-mm-YYYY HH:MM:SS>` in local time.
pub fn default_run_name() -> String {
    format!(
        "posts-eval-{}",
        chrono::Local::now().format("%d-%m-%Y %H:%M:%S")
    )
}

fn parse_metric_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

fn validate_metrics(metrics: &[String]) -> Result<()> {
    if metrics.is_empty() {
        anyhow::bail!("at least one metric must be selected");
    }
    for metric in metrics {
        if !scorer::is_known_metric(metric) {
            anyhow::bail!(
                "Unknown metric: '{}'. Available: {}",
                metric,
                scorer::KNOWN_METRICS.join(", ")
            );
        }
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

fn validate(config: &Config) -> Result<()> {
    if config.workflow.timeout_secs == 0 {
        anyhow::bail!("workflow.timeout_secs must be > 0");
    }

    if config.tracking.batch_size == 0 {
        anyhow::bail!("tracking.batch_size must be >= 1");
    }

    match config.tracking.provider.as_str() {
        "langfuse" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown tracking provider: '{}'. Must be langfuse or disabled.",
            other
        ),
    }

    validate_metrics(&config.run.metrics)
}
