use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::DbConfig;
use crate::db;

/// Sample venues: `(nombre, ciudad, provincia, aforo)`.
const SEED_VENUES: &[(&str, &str, &str, i64)] = &[
    ("Riquela Club", "Santiago de Compostela", "A Coruña", 200),
    ("Clandestino", "A Coruña", "A Coruña", 150),
    ("Sala Malatesta", "Vigo", "Pontevedra", 300),
];

/// Sample events: `(artist, venue, date)`.
const SEED_EVENTS: &[(&str, &str, &str)] = &[
    ("javierturnes", "Riquela Club", "2024-04-12"),
    ("tulsamireniza", "Riquela Club", "2024-04-19"),
    ("freedoniasoul", "Riquela Club", "2024-04-20"),
    ("madmartintrio", "Riquela Club", "2024-04-26"),
    ("nubiyantwist", "Riquela Club", "2024-04-28"),
    ("insaniam", "Clandestino", "2024-05-10"),
    ("nodropforus", "Clandestino", "2024-05-10"),
    ("frequency", "Clandestino", "2024-05-10"),
];

pub async fn run_migrations(config: &DbConfig, seed: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    if seed {
        insert_sample_data(&pool).await?;
    }
    pool.close().await;
    Ok(())
}

/// Create the artist/venue/event tables. Idempotent.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artista (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sala (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL UNIQUE,
            ciudad TEXT,
            provincia TEXT,
            aforo INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS eventos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            artista_id INTEGER NOT NULL REFERENCES artista(id),
            sala_id INTEGER NOT NULL REFERENCES sala(id),
            fecha TEXT NOT NULL,
            UNIQUE(artista_id, sala_id, fecha)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_eventos_fecha ON eventos(fecha)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn insert_sample_data(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (artist, _, _) in SEED_EVENTS {
        sqlx::query("INSERT INTO artista (nombre) VALUES (?) ON CONFLICT DO NOTHING")
            .bind(artist)
            .execute(&mut *tx)
            .await?;
    }

    for (name, city, province, capacity) in SEED_VENUES {
        sqlx::query(
            "INSERT INTO sala (nombre, ciudad, provincia, aforo) VALUES (?, ?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(name)
        .bind(city)
        .bind(province)
        .bind(capacity)
        .execute(&mut *tx)
        .await?;
    }

    for (artist, venue, date) in SEED_EVENTS {
        sqlx::query(
            r#"
            INSERT INTO eventos (artista_id, sala_id, fecha)
            SELECT a.id, s.id, ? FROM artista a, sala s
            WHERE a.nombre = ? AND s.nombre = ?
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(date)
        .bind(artist)
        .bind(venue)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
