use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Measurement points; timestamps are microseconds since the epoch (UTC)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            value REAL NOT NULL,
            timestamp_us INTEGER NOT NULL,
            longitude REAL NOT NULL,
            latitude REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Import ledger
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imported_files (
            filename TEXT PRIMARY KEY,
            imported_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Response cache; NULL bounds are unbounded
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS response_cache (
            fingerprint TEXT PRIMARY KEY,
            covered_begin INTEGER,
            covered_end INTEGER,
            payload BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cache invalidation counter; exactly one row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_generation (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            value INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("INSERT OR IGNORE INTO cache_generation (id, value) VALUES (1, 0)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_measurements_timestamp ON measurements(timestamp_us)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_measurements_location ON measurements(longitude, latitude)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_response_cache_begin ON response_cache(covered_begin)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_response_cache_end ON response_cache(covered_end)")
        .execute(pool)
        .await?;

    tracing::info!("schema up to date");
    Ok(())
}
