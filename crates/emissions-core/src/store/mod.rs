//! Storage abstraction for measurement points and the import ledger.
//!
//! The [`Store`] trait is the only way the read and ingest paths touch
//! persisted points, so any engine that can filter by time and location
//! can back the service (SQLite in the `emissions-api` package, the
//! in-memory store here for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::aggregate::{self, AggregateRows, AggregateSpec};
use crate::error::Result;
use crate::filter::{Pagination, PointFilter};
use crate::models::{ImportBatch, IngestReport, MeasurementPoint, NewPoint, StoreStats};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](Store::insert) | Append a batch of points, all-or-nothing |
/// | [`has_imported`](Store::has_imported) | Check the import ledger |
/// | [`mark_imported`](Store::mark_imported) | Record a source file; `DuplicateImport` if present |
/// | [`ingest`](Store::ingest) | Ledger mark + insert in one transaction |
/// | [`query_points`](Store::query_points) | Filtered, paginated points in id order |
/// | [`aggregate`](Store::aggregate) | Daily averages or statistics over filtered points |
/// | [`stats`](Store::stats) | Counters for operators |
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends points atomically and returns how many were written.
    async fn insert(&self, points: &[NewPoint]) -> Result<u64>;

    async fn has_imported(&self, filename: &str) -> Result<bool>;

    /// Fails with [`Error::DuplicateImport`](crate::Error::DuplicateImport)
    /// when the filename is already in the ledger.
    async fn mark_imported(&self, filename: &str) -> Result<()>;

    /// Marks `batch.source` (when set) and inserts `batch.points` as one
    /// unit: either both become visible or neither does.
    async fn ingest(&self, batch: &ImportBatch) -> Result<IngestReport>;

    /// Points matching `filter`, ordered by id, with `page` applied after
    /// filtering.
    async fn query_points(
        &self,
        filter: &PointFilter,
        page: &Pagination,
    ) -> Result<Vec<MeasurementPoint>>;

    /// Groups the same point set [`query_points`](Store::query_points)
    /// yields, then applies `page` to the ordered groups.
    ///
    /// The default buffers the filtered points first. Both bundled
    /// backends override it to fold rows into an [`Aggregator`](crate::aggregate::Aggregator) as they
    /// are read, keeping only per-bucket totals.
    async fn aggregate(
        &self,
        filter: &PointFilter,
        spec: &AggregateSpec,
        page: &Pagination,
    ) -> Result<AggregateRows> {
        let points = self.query_points(filter, &Pagination::all()).await?;
        Ok(aggregate::aggregate(&points, spec).paginate(page))
    }

    async fn stats(&self) -> Result<StoreStats>;
}
