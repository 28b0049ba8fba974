//! In-memory [`Store`] implementation for testing.
//!
//! Points live in a `Vec` in id order behind a single `RwLock`, so a batch
//! and its ledger mark are applied under one write guard.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::aggregate::{AggregateRows, AggregateSpec, Aggregator};
use crate::error::{Error, Result};
use crate::filter::{Pagination, PointFilter};
use crate::models::{
    ImportBatch, IngestReport, Location, MeasurementPoint, NewPoint, StoreStats,
};

use super::Store;

#[derive(Default)]
struct Inner {
    points: Vec<MeasurementPoint>,
    next_id: i64,
    imported: BTreeSet<String>,
}

impl Inner {
    /// Validates every row before appending any.
    fn append(&mut self, points: &[NewPoint]) -> Result<u64> {
        let mut staged = Vec::with_capacity(points.len());
        for (index, p) in points.iter().enumerate() {
            if !p.value.is_finite() {
                return Err(Error::InvalidMeasurement {
                    index,
                    message: format!("value {} is not finite", p.value),
                });
            }
            let location = Location::new(p.longitude, p.latitude)
                .map_err(|message| Error::InvalidMeasurement { index, message })?;
            staged.push(MeasurementPoint {
                id: self.next_id + 1 + index as i64,
                value: p.value,
                timestamp: p.timestamp,
                location,
            });
        }
        self.next_id += staged.len() as i64;
        self.points.extend(staged);
        Ok(points.len() as u64)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::storage("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert(&self, points: &[NewPoint]) -> Result<u64> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.append(points)
    }

    async fn has_imported(&self, filename: &str) -> Result<bool> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.imported.contains(filename))
    }

    async fn mark_imported(&self, filename: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.imported.insert(filename.to_string()) {
            return Err(Error::DuplicateImport(filename.to_string()));
        }
        Ok(())
    }

    async fn ingest(&self, batch: &ImportBatch) -> Result<IngestReport> {
        batch.validate()?;
        let mut inner = self.inner.write().map_err(poisoned)?;
        if let Some(source) = &batch.source {
            if inner.imported.contains(source) {
                return Err(Error::DuplicateImport(source.clone()));
            }
        }
        let inserted = inner.append(&batch.points)?;
        if let Some(source) = &batch.source {
            inner.imported.insert(source.clone());
        }
        Ok(IngestReport {
            source: batch.source.clone(),
            inserted,
            span: batch.span(),
        })
    }

    async fn query_points(
        &self,
        filter: &PointFilter,
        page: &Pagination,
    ) -> Result<Vec<MeasurementPoint>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(page
            .apply(inner.points.iter().filter(|p| filter.matches(p)))
            .cloned()
            .collect())
    }

    async fn aggregate(
        &self,
        filter: &PointFilter,
        spec: &AggregateSpec,
        page: &Pagination,
    ) -> Result<AggregateRows> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut aggregator = Aggregator::new(*spec);
        aggregator.extend(inner.points.iter().filter(|p| filter.matches(p)));
        Ok(aggregator.finish().paginate(page))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(StoreStats {
            points: inner.points.len() as i64,
            imported_files: inner.imported.len() as i64,
            earliest: inner.points.iter().map(|p| p.timestamp).min(),
            latest: inner.points.iter().map(|p| p.timestamp).max(),
        })
    }
}
