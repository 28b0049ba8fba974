//! SQLite-backed [`Store`] implementation.
//!
//! Points are rows of `measurements` keyed by an autoincrement id, which is
//! also the stable result order. The time clause and, when present, the
//! bounding box of the spatial clause run in SQL against the indexes; the
//! exact spatial predicate runs in Rust over the streamed rows, and
//! pagination follows it so offsets count matching points only.
//! Aggregates fold the same stream into per-bucket totals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use emissions_core::aggregate::{AggregateRows, AggregateSpec, Aggregator};
use emissions_core::filter::{Pagination, PointFilter};
use emissions_core::models::{
    ImportBatch, IngestReport, Location, MeasurementPoint, NewPoint, StoreStats,
};
use emissions_core::store::Store;
use emissions_core::{Error, Result};

use crate::session::{storage_error, with_transaction};
use crate::sqlite_cache;

/// Rows per multi-value INSERT; four binds each.
const INSERT_CHUNK: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn micros_to_utc(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| Error::storage(format!("stored timestamp out of range: {}", us)))
}

fn row_to_point(row: &SqliteRow) -> Result<MeasurementPoint> {
    let id: i64 = row.try_get("id").map_err(storage_error)?;
    let location = Location::new(
        row.try_get("longitude").map_err(storage_error)?,
        row.try_get("latitude").map_err(storage_error)?,
    )
    .map_err(|m| Error::storage(format!("corrupt location in row {}: {}", id, m)))?;
    Ok(MeasurementPoint {
        id,
        value: row.try_get("value").map_err(storage_error)?,
        timestamp: micros_to_utc(row.try_get("timestamp_us").map_err(storage_error)?)?,
        location,
    })
}

fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

async fn insert_rows(conn: &mut SqliteConnection, points: &[NewPoint]) -> Result<u64> {
    let mut inserted = 0;
    for chunk in points.chunks(INSERT_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO measurements (value, timestamp_us, longitude, latitude) ",
        );
        qb.push_values(chunk, |mut b, p| {
            b.push_bind(p.value)
                .push_bind(p.timestamp.timestamp_micros())
                .push_bind(p.longitude)
                .push_bind(p.latitude);
        });
        let result = qb.build().execute(&mut *conn).await.map_err(storage_error)?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

async fn mark_ledger(conn: &mut SqliteConnection, filename: &str) -> Result<()> {
    let result = sqlx::query("INSERT INTO imported_files (filename, imported_at) VALUES (?, ?)")
        .bind(filename)
        .bind(Utc::now().timestamp())
        .execute(&mut *conn)
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(Error::DuplicateImport(filename.to_string()))
        }
        Err(e) => Err(storage_error(e)),
    }
}

/// Rows passing the time clause and the bounding box of the spatial clause,
/// in id order. The exact spatial predicate is left to the caller.
fn select_candidates(filter: &PointFilter) -> QueryBuilder<'static, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, value, timestamp_us, longitude, latitude FROM measurements WHERE 1 = 1",
    );
    if let Some(begin) = filter.time().begin() {
        qb.push(" AND timestamp_us >= ").push_bind(begin.timestamp_micros());
    }
    if let Some(end) = filter.time().end() {
        qb.push(" AND timestamp_us < ").push_bind(end.timestamp_micros());
    }
    if let Some(spatial) = filter.spatial() {
        let b = spatial.prefilter();
        qb.push(" AND longitude BETWEEN ")
            .push_bind(b.min_lon)
            .push(" AND ")
            .push_bind(b.max_lon)
            .push(" AND latitude BETWEEN ")
            .push_bind(b.min_lat)
            .push(" AND ")
            .push_bind(b.max_lat);
    }
    qb.push(" ORDER BY id");
    qb
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, points: &[NewPoint]) -> Result<u64> {
        let batch = ImportBatch::anonymous(points.to_vec());
        batch.validate()?;
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move { insert_rows(conn, &batch.points).await })
        })
        .await
    }

    async fn has_imported(&self, filename: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM imported_files WHERE filename = ?)")
            .bind(filename)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn mark_imported(&self, filename: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        mark_ledger(&mut *conn, filename).await
    }

    async fn ingest(&self, batch: &ImportBatch) -> Result<IngestReport> {
        batch.validate()?;
        let span = batch.span();
        let owned = batch.clone();

        let inserted = with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                if let Some(source) = &owned.source {
                    mark_ledger(&mut *conn, source).await?;
                }
                let inserted = insert_rows(&mut *conn, &owned.points).await?;
                if let Some(span) = span {
                    let removed = sqlite_cache::invalidate_overlapping(
                        &mut *conn,
                        span.earliest,
                        span.latest,
                    )
                    .await
                    .map_err(storage_error)?;
                    tracing::debug!(removed, "dropped overlapping cache rows in ingest transaction");
                }
                Ok(inserted)
            })
        })
        .await?;

        Ok(IngestReport {
            source: batch.source.clone(),
            inserted,
            span,
        })
    }

    async fn query_points(
        &self,
        filter: &PointFilter,
        page: &Pagination,
    ) -> Result<Vec<MeasurementPoint>> {
        if filter.time().is_empty() || page.limit == Some(0) {
            return Ok(Vec::new());
        }

        let exact_in_sql = filter.spatial().is_none();
        let mut qb = select_candidates(filter);
        if exact_in_sql && !page.is_unbounded() {
            // SQLite reads a negative LIMIT as "no limit"
            let limit = page.limit.map(to_sql_count).unwrap_or(-1);
            qb.push(" LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind(to_sql_count(page.offset));
        }

        let mut rows = qb.build().fetch(&self.pool);
        let mut out = Vec::new();
        let mut skipped = 0u64;
        while let Some(row) = rows.try_next().await.map_err(storage_error)? {
            let point = row_to_point(&row)?;
            if !exact_in_sql {
                if !filter.matches(&point) {
                    continue;
                }
                if skipped < page.offset {
                    skipped += 1;
                    continue;
                }
            }
            out.push(point);
            if page.limit.is_some_and(|l| out.len() as u64 >= l) {
                break;
            }
        }
        Ok(out)
    }

    /// Folds the streamed rows into per-bucket totals without buffering
    /// the matching points.
    async fn aggregate(
        &self,
        filter: &PointFilter,
        spec: &AggregateSpec,
        page: &Pagination,
    ) -> Result<AggregateRows> {
        let mut aggregator = Aggregator::new(*spec);
        if filter.time().is_empty() {
            return Ok(aggregator.finish());
        }

        let exact_in_sql = filter.spatial().is_none();
        let mut qb = select_candidates(filter);
        let mut rows = qb.build().fetch(&self.pool);
        while let Some(row) = rows.try_next().await.map_err(storage_error)? {
            let point = row_to_point(&row)?;
            if exact_in_sql || filter.matches(&point) {
                aggregator.push(&point);
            }
        }
        Ok(aggregator.finish().paginate(page))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let (points, earliest, latest): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(timestamp_us), MAX(timestamp_us) FROM measurements",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let imported_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM imported_files")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(StoreStats {
            points,
            imported_files,
            earliest: earliest.map(micros_to_utc).transpose()?,
            latest: latest.map(micros_to_utc).transpose()?,
        })
    }
}
