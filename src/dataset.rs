//! Dataset sources for evaluation runs.
//!
//! A [`DatasetSource`] materializes the whole dataset eagerly, so a malformed
//! row fails the run before any extraction call or telemetry is issued.
//!
//! Two backends share the contract:
//! - [`CsvDataset`]: a delimited file with `id,input,expected_output`
//!   columns (plus an optional `metadata` column), the last two holding
//!   JSON-encoded text.
//! - [`LangfuseDataset`]: a named remote dataset pulled page by page from
//!   the tracking backend.
//!
//! Use [`open_source`] to pick a backend from a dataset reference:
//! `langfuse:<name>` selects the remote backend, anything else is a file path.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::DatasetError;
use crate::models::DatasetItem;
use crate::tracking::langfuse::LangfuseClient;

/// Prefix selecting the remote backend in a dataset reference.
pub const REMOTE_PREFIX: &str = "langfuse:";

/// Page size used when pulling remote dataset items.
const REMOTE_PAGE_SIZE: u32 = 50;

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Name used in logs and run summaries.
    fn name(&self) -> &str;

    /// Load every item, in dataset order.
    async fn load(&self) -> Result<Vec<DatasetItem>, DatasetError>;
}

/// Resolve a dataset reference into a source.
pub fn open_source(reference: &str, config: &Config) -> anyhow::Result<Box<dyn DatasetSource>> {
    match reference.strip_prefix(REMOTE_PREFIX) {
        Some(name) => {
            if name.is_empty() {
                anyhow::bail!("remote dataset reference needs a name: '{}<name>'", REMOTE_PREFIX);
            }
            let client = LangfuseClient::new(&config.tracking)?;
            Ok(Box::new(LangfuseDataset::new(client, name)))
        }
        None => Ok(Box::new(CsvDataset::new(reference))),
    }
}

// ============ File backend ============

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    input: String,
    expected_output: String,
    #[serde(default)]
    metadata: Option<String>,
}

/// CSV file backend.
pub struct CsvDataset {
    path: PathBuf,
    name: String,
}

impl CsvDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }
}

#[async_trait]
impl DatasetSource for CsvDataset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<DatasetItem>, DatasetError> {
        let file = std::fs::File::open(&self.path)?;
        parse_csv(file)
    }
}

/// Parse CSV dataset rows. Any row with invalid JSON aborts the whole load.
pub fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<DatasetItem>, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut items = Vec::new();
    for (idx, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = record?;
        let row_number = idx + 1;

        let input = parse_json_cell(&row.input, row_number, "input")?;
        let expected_output = parse_json_cell(&row.expected_output, row_number, "expected_output")?;
        let metadata = match row.metadata.as_deref().map(str::trim) {
            None | Some("") => Map::new(),
            Some(raw) => match parse_json_cell(raw, row_number, "metadata")? {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            },
        };

        items.push(DatasetItem {
            id: row.id,
            input,
            expected_output,
            metadata,
        });
    }

    Ok(items)
}

fn parse_json_cell(raw: &str, row: usize, column: &'static str) -> Result<Value, DatasetError> {
    serde_json::from_str(raw).map_err(|source| DatasetError::Json {
        row,
        column,
        source,
    })
}

// ============ Remote backend ============

/// Remote dataset stored in Langfuse, fetched via
/// `GET /api/public/dataset-items?datasetName=<name>&page=<n>&limit=<k>`.
pub struct LangfuseDataset {
    client: LangfuseClient,
    dataset_name: String,
    label: String,
}

impl LangfuseDataset {
    pub fn new(client: LangfuseClient, dataset_name: &str) -> Self {
        Self {
            client,
            dataset_name: dataset_name.to_string(),
            label: format!("{}{}", REMOTE_PREFIX, dataset_name),
        }
    }
}

#[async_trait]
impl DatasetSource for LangfuseDataset {
    fn name(&self) -> &str {
        &self.label
    }

    async fn load(&self) -> Result<Vec<DatasetItem>, DatasetError> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let body = self
                .client
                .dataset_items_page(&self.dataset_name, page, REMOTE_PAGE_SIZE)
                .await
                .map_err(|e| DatasetError::Remote(e.to_string()))?;

            let data = body
                .get("data")
                .and_then(|d| d.as_array())
                .ok_or_else(|| DatasetError::Remote("response missing 'data' array".to_string()))?;

            for raw in data {
                items.push(convert_remote_item(raw)?);
            }

            let total_pages = body
                .get("meta")
                .and_then(|m| m.get("totalPages"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0);

            if data.is_empty() || u64::from(page) >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!(dataset = %self.dataset_name, pages = page, "remote dataset paged");
        Ok(items)
    }
}

/// Map one remote dataset item onto a [`DatasetItem`]. Only field presence
/// is checked.
pub fn convert_remote_item(raw: &Value) -> Result<DatasetItem, DatasetError> {
    let id = match raw.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => {
            return Err(DatasetError::MissingField {
                item: "<unknown>".to_string(),
                field: "id",
            })
        }
    };

    let field = |name: &'static str| {
        raw.get(name).cloned().ok_or_else(|| DatasetError::MissingField {
            item: id.clone(),
            field: name,
        })
    };

    let input = field("input")?;
    let expected_output = field("expectedOutput")?;
    let metadata = match raw.get("metadata") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Ok(DatasetItem {
        id,
        input,
        expected_output,
        metadata,
    })
}

/// A fixed list of items, for programmatic runs and tests.
pub struct StaticDataset {
    name: String,
    items: Vec<DatasetItem>,
}

impl StaticDataset {
    pub fn new(name: impl Into<String>, items: Vec<DatasetItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

#[async_trait]
impl DatasetSource for StaticDataset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<DatasetItem>, DatasetError> {
        Ok(self.items.clone())
    }
}
