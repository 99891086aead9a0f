//! Persistence sink for extracted events.
//!
//! Extraction outputs carry three lists: `artistas`, `fecha` (dates) and
//! `ubicacion` (venues). [`save_results`] stores every
//! artist × venue × date combination as an event, creating artists and
//! venues on first sight. All operations are find-or-create, so saving the
//! same output twice yields the same identifiers.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::PersistenceError;

/// Idempotent upserts keyed by natural names.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn find_or_create_artist(&self, name: &str) -> Result<i64, PersistenceError>;

    async fn find_or_create_venue(&self, name: &str) -> Result<i64, PersistenceError>;

    async fn find_or_create_event(
        &self,
        artist_id: i64,
        venue_id: i64,
        date: &str,
    ) -> Result<i64, PersistenceError>;
}

/// SQLite implementation of [`EventSink`] over the `artista`, `sala` and
/// `eventos` tables.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn find_or_create_named(&self, table: &str, name: &str) -> Result<i64, PersistenceError> {
        let existing: Option<i64> =
            sqlx::query_scalar(&format!("SELECT id FROM {} WHERE nombre = ?", table))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let result = sqlx::query(&format!("INSERT INTO {} (nombre) VALUES (?)", table))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl EventSink for SqliteSink {
    async fn find_or_create_artist(&self, name: &str) -> Result<i64, PersistenceError> {
        self.find_or_create_named("artista", name).await
    }

    async fn find_or_create_venue(&self, name: &str) -> Result<i64, PersistenceError> {
        self.find_or_create_named("sala", name).await
    }

    async fn find_or_create_event(
        &self,
        artist_id: i64,
        venue_id: i64,
        date: &str,
    ) -> Result<i64, PersistenceError> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM eventos WHERE artista_id = ? AND sala_id = ? AND fecha = ?",
        )
        .bind(artist_id)
        .bind(venue_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let result = sqlx::query("INSERT INTO eventos (artista_id, sala_id, fecha) VALUES (?, ?, ?)")
            .bind(artist_id)
            .bind(venue_id)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Identifiers touched by one [`save_results`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub artist_ids: Vec<i64>,
    pub venue_ids: Vec<i64>,
    pub event_ids: Vec<i64>,
}

fn string_list(output: &Value, key: &str) -> Vec<String> {
    match output.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Persist one extraction output through `sink`.
///
/// Returns [`PersistenceError::Incomplete`] without writing anything when
/// the output lacks artists, dates or venues.
pub async fn save_results(
    sink: &dyn EventSink,
    output: &Value,
) -> Result<SaveReport, PersistenceError> {
    let artists = string_list(output, "artistas");
    let dates = string_list(output, "fecha");
    let venues = string_list(output, "ubicacion");

    if artists.is_empty() || dates.is_empty() || venues.is_empty() {
        return Err(PersistenceError::Incomplete(format!(
            "{} artist(s), {} date(s), {} venue(s)",
            artists.len(),
            dates.len(),
            venues.len()
        )));
    }

    let mut report = SaveReport::default();

    let mut venue_ids = Vec::with_capacity(venues.len());
    for venue in &venues {
        venue_ids.push(sink.find_or_create_venue(venue).await?);
    }
    report.venue_ids = venue_ids.clone();

    for artist in &artists {
        let artist_id = sink.find_or_create_artist(artist).await?;
        report.artist_ids.push(artist_id);

        for venue_id in &venue_ids {
            for date in &dates {
                let event_id = sink.find_or_create_event(artist_id, *venue_id, date).await?;
                tracing::debug!(event_id, artist = %artist, date = %date, "event saved");
                report.event_ids.push(event_id);
            }
        }
    }

    Ok(report)
}

/// An event joined with its artist and venue.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub artist: String,
    pub venue: String,
    pub city: Option<String>,
    pub date: String,
}

pub async fn list_events(pool: &SqlitePool) -> Result<Vec<EventRow>, PersistenceError> {
    let rows = sqlx::query(
        r#"
        SELECT e.id, a.nombre AS artista, s.nombre AS sala, s.ciudad, e.fecha
        FROM eventos e
        JOIN artista a ON e.artista_id = a.id
        JOIN sala s ON e.sala_id = s.id
        ORDER BY e.fecha, e.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| EventRow {
            id: row.get("id"),
            artist: row.get("artista"),
            venue: row.get("sala"),
            city: row.get("ciudad"),
            date: row.get("fecha"),
        })
        .collect())
}

/// `peval events`: print stored events ordered by date.
pub async fn run_list_events(config: &crate::config::DbConfig) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::ensure_schema(&pool).await?;
    let events = list_events(&pool).await?;

    println!(
        "{:<6} {:<20} {:<20} {:<24} FECHA",
        "ID", "ARTISTA", "SALA", "CIUDAD"
    );
    for event in &events {
        println!(
            "{:<6} {:<20} {:<20} {:<24} {}",
            event.id,
            event.artist,
            event.venue,
            event.city.as_deref().unwrap_or("-"),
            event.date
        );
    }
    println!("{} event(s)", events.len());

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_list_variants() {
        let output = json!({
            "artistas": ["insaniam", 42, null, "  "],
            "fecha": "2024-05-10",
            "ubicacion": {"not": "a list"}
        });
        assert_eq!(string_list(&output, "artistas"), vec!["insaniam", "42"]);
        assert_eq!(string_list(&output, "fecha"), vec!["2024-05-10"]);
        assert!(string_list(&output, "ubicacion").is_empty());
        assert!(string_list(&json!("diagnostic"), "artistas").is_empty());
    }
}
