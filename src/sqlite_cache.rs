//! SQLite-backed [`ResponseCache`].
//!
//! Entries live in the `response_cache` table of the same database as the
//! points, so [`SqliteStore::ingest`](crate::sqlite_store::SqliteStore) can
//! invalidate inside its own transaction. The generation is the single row
//! of `cache_generation`; invalidation bumps it in the same transaction as
//! the delete, and `store` inserts only while it still holds the value the
//! reader saw.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use emissions_core::cache::{CoveredInterval, Generation, Payload, ResponseCache};
use emissions_core::fingerprint::Fingerprint;
use emissions_core::{Error, Result};

/// Rows whose covered interval overlaps `[earliest, latest]`. Same rule as
/// [`CoveredInterval::overlaps`].
const DELETE_OVERLAPPING: &str = r#"
    DELETE FROM response_cache
    WHERE (covered_end IS NULL OR covered_end > ?)
      AND (covered_begin IS NULL OR covered_begin <= ?)
"#;

const BUMP_GENERATION: &str = "UPDATE cache_generation SET value = value + 1 WHERE id = 1";

const SELECT_GENERATION: &str = "SELECT value FROM cache_generation WHERE id = 1";

/// Upsert guarded by the generation; a single statement, so the check and
/// the write cannot be split by a concurrent invalidation.
const STORE_IF_CURRENT: &str = r#"
    INSERT INTO response_cache (fingerprint, covered_begin, covered_end, payload, created_at)
    SELECT ?, ?, ?, ?, ?
    WHERE (SELECT value FROM cache_generation WHERE id = 1) = ?
    ON CONFLICT(fingerprint) DO UPDATE SET
        covered_begin = excluded.covered_begin,
        covered_end = excluded.covered_end,
        payload = excluded.payload,
        created_at = excluded.created_at
"#;

fn to_sql_generation(generation: Generation) -> i64 {
    i64::try_from(generation.get()).unwrap_or(i64::MAX)
}

fn from_sql_generation(value: i64) -> Generation {
    Generation::new(u64::try_from(value).unwrap_or_default())
}

/// Advances the generation and deletes overlapping entries. Run it inside
/// a transaction so both land together.
pub(crate) async fn invalidate_overlapping(
    conn: &mut SqliteConnection,
    earliest: DateTime<Utc>,
    latest: DateTime<Utc>,
) -> std::result::Result<u64, sqlx::Error> {
    sqlx::query(BUMP_GENERATION).execute(&mut *conn).await?;
    let result = sqlx::query(DELETE_OVERLAPPING)
        .bind(earliest.timestamp_micros())
        .bind(latest.timestamp_micros())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

fn cache_error(err: sqlx::Error) -> Error {
    Error::cache(err.to_string())
}

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn len(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(cache_error)
    }

    pub async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM response_cache WHERE fingerprint = ?)")
            .bind(fingerprint.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(cache_error)
    }
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Payload>> {
        let payload: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT payload FROM response_cache WHERE fingerprint = ?")
                .bind(fingerprint.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(cache_error)?;
        Ok(payload.map(Payload::from_bytes))
    }

    async fn generation(&self) -> Result<Generation> {
        let value: i64 = sqlx::query_scalar(SELECT_GENERATION)
            .fetch_one(&self.pool)
            .await
            .map_err(cache_error)?;
        Ok(from_sql_generation(value))
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        covered: CoveredInterval,
        payload: Payload,
        seen: Generation,
    ) -> Result<bool> {
        let result = sqlx::query(STORE_IF_CURRENT)
            .bind(fingerprint.as_str())
            .bind(covered.begin.map(|t| t.timestamp_micros()))
            .bind(covered.end.map(|t| t.timestamp_micros()))
            .bind(payload.into_bytes())
            .bind(Utc::now().timestamp())
            .bind(to_sql_generation(seen))
            .execute(&self.pool)
            .await
            .map_err(cache_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn invalidate(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(cache_error)?;
        let removed = invalidate_overlapping(&mut *tx, earliest, latest)
            .await
            .map_err(cache_error)?;
        tx.commit().await.map_err(cache_error)?;
        Ok(removed)
    }
}
