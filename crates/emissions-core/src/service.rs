//! Cache-through read path and the ingest protocol.
//!
//! [`QueryService`] composes a [`Store`] with a [`ResponseCache`]. Reads
//! fingerprint the request, try the cache, compute on a miss, and store the
//! encoded result tagged with the request's time bounds. Ingest commits
//! through the store first and only then invalidates the cache.
//!
//! A miss reads the cache [`Generation`] before touching the store. The
//! fill is conditional on it, so a result computed across a concurrent
//! ingest is returned to its caller but not cached.
//!
//! Cache failures never reach the caller: they are logged and treated as a
//! miss (reads) or ignored (writes).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregate::{AggregateRows, AggregateSpec, Granularity};
use crate::cache::{CoveredInterval, Generation, Payload, ResponseCache};
use crate::error::Result;
use crate::filter::{Pagination, PointFilter};
use crate::fingerprint::{Fingerprint, QueryKind};
use crate::models::{DailyAverage, FeatureCollection, ImportBatch, IngestReport, StatisticsRow};
use crate::store::Store;

pub struct QueryService<S, C> {
    store: S,
    cache: C,
}

impl<S: Store, C: ResponseCache> QueryService<S, C> {
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Matching points as a GeoJSON feature collection.
    pub async fn points(&self, filter: &PointFilter, page: &Pagination) -> Result<FeatureCollection> {
        let key = Fingerprint::of(&QueryKind::Points, filter, page);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        let seen = self.generation().await;
        let points = self.store.query_points(filter, page).await?;
        let result = FeatureCollection::from(points);
        self.remember(&key, filter, &result, seen).await;
        Ok(result)
    }

    pub async fn daily_averages(
        &self,
        filter: &PointFilter,
        page: &Pagination,
    ) -> Result<Vec<DailyAverage>> {
        let key = Fingerprint::of(&QueryKind::DailyAverage, filter, page);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        let seen = self.generation().await;
        let rows = match self
            .store
            .aggregate(filter, &AggregateSpec::DailyAverage, page)
            .await?
        {
            AggregateRows::Daily(rows) => rows,
            AggregateRows::Statistics(_) => Vec::new(),
        };
        self.remember(&key, filter, &rows, seen).await;
        Ok(rows)
    }

    pub async fn statistics(
        &self,
        filter: &PointFilter,
        granularity: Granularity,
        page: &Pagination,
    ) -> Result<Vec<StatisticsRow>> {
        let key = Fingerprint::of(&QueryKind::Statistics(granularity), filter, page);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }
        let seen = self.generation().await;
        let rows = match self
            .store
            .aggregate(filter, &AggregateSpec::Statistics(granularity), page)
            .await?
        {
            AggregateRows::Statistics(rows) => rows,
            AggregateRows::Daily(_) => Vec::new(),
        };
        self.remember(&key, filter, &rows, seen).await;
        Ok(rows)
    }

    /// Commits the batch, then drops every cache entry overlapping its span.
    ///
    /// Invalidation runs only after the store reports success and advances
    /// the cache generation, so a read that took its snapshot before the
    /// commit cannot fill the cache afterwards.
    pub async fn ingest(&self, batch: &ImportBatch) -> Result<IngestReport> {
        let report = self.store.ingest(batch).await?;
        if let Some(span) = report.span {
            match self.cache.invalidate(span.earliest, span.latest).await {
                Ok(removed) => tracing::debug!(
                    removed,
                    earliest = %span.earliest,
                    latest = %span.latest,
                    "invalidated cache entries"
                ),
                Err(e) => tracing::warn!(error = %e, "cache invalidation failed after ingest"),
            }
        }
        tracing::info!(
            source = report.source.as_deref().unwrap_or("-"),
            inserted = report.inserted,
            "ingested batch"
        );
        Ok(report)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        match self.cache.lookup(key).await {
            Ok(Some(payload)) => match payload.decode() {
                Ok(value) => {
                    tracing::debug!(fingerprint = %key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(fingerprint = %key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(fingerprint = %key, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// `None` when the cache is unreachable; the response is then not
    /// cached.
    async fn generation(&self) -> Option<Generation> {
        match self.cache.generation().await {
            Ok(generation) => Some(generation),
            Err(e) => {
                tracing::warn!(error = %e, "cache generation unavailable");
                None
            }
        }
    }

    async fn remember<T: Serialize>(
        &self,
        key: &Fingerprint,
        filter: &PointFilter,
        value: &T,
        seen: Option<Generation>,
    ) {
        let Some(seen) = seen else {
            return;
        };
        let payload = match Payload::encode(value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(fingerprint = %key, error = %e, "not caching response");
                return;
            }
        };
        let covered = CoveredInterval::from(filter.time());
        match self.cache.store(key, covered, payload, seen).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                fingerprint = %key,
                generation = %seen,
                "cache invalidated while computing; response not cached"
            ),
            Err(e) => tracing::warn!(fingerprint = %key, error = %e, "cache store failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use crate::error::Error;
    use crate::filter::RegionSelector;
    use crate::models::{MeasurementPoint, NewPoint, StoreStats};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, month, day, 12, 0, 0).unwrap()
    }

    fn np(value: f64, lon: f64, lat: f64, ts: DateTime<Utc>) -> NewPoint {
        NewPoint::new(value, lon, lat, ts)
    }

    fn service() -> QueryService<InMemoryStore, Arc<InMemoryCache>> {
        QueryService::new(InMemoryStore::new(), Arc::new(InMemoryCache::new()))
    }

    fn may() -> PointFilter {
        PointFilter::builder()
            .begin(at(5, 1))
            .end(at(5, 31))
            .build()
            .unwrap()
    }

    struct FailingCache;

    #[async_trait]
    impl ResponseCache for FailingCache {
        async fn lookup(&self, _: &Fingerprint) -> Result<Option<Payload>> {
            Err(Error::cache("connection refused"))
        }

        async fn generation(&self) -> Result<Generation> {
            Err(Error::cache("connection refused"))
        }

        async fn store(
            &self,
            _: &Fingerprint,
            _: CoveredInterval,
            _: Payload,
            _: Generation,
        ) -> Result<bool> {
            Err(Error::cache("connection refused"))
        }

        async fn invalidate(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<u64> {
            Err(Error::cache("connection refused"))
        }
    }

    /// Store whose next read commits a pending batch, invalidating the
    /// shared cache, after taking its snapshot and before returning it.
    struct IngestMidRead {
        inner: InMemoryStore,
        cache: Arc<InMemoryCache>,
        pending: Mutex<Option<ImportBatch>>,
    }

    impl IngestMidRead {
        fn new(cache: Arc<InMemoryCache>) -> Self {
            Self {
                inner: InMemoryStore::new(),
                cache,
                pending: Mutex::new(None),
            }
        }

        fn arm(&self, batch: ImportBatch) {
            *self.pending.lock().unwrap() = Some(batch);
        }
    }

    #[async_trait]
    impl Store for IngestMidRead {
        async fn insert(&self, points: &[NewPoint]) -> Result<u64> {
            self.inner.insert(points).await
        }

        async fn has_imported(&self, filename: &str) -> Result<bool> {
            self.inner.has_imported(filename).await
        }

        async fn mark_imported(&self, filename: &str) -> Result<()> {
            self.inner.mark_imported(filename).await
        }

        async fn ingest(&self, batch: &ImportBatch) -> Result<IngestReport> {
            self.inner.ingest(batch).await
        }

        async fn query_points(
            &self,
            filter: &PointFilter,
            page: &Pagination,
        ) -> Result<Vec<MeasurementPoint>> {
            let snapshot = self.inner.query_points(filter, page).await?;
            let pending = self.pending.lock().unwrap().take();
            if let Some(batch) = pending {
                let report = self.inner.ingest(&batch).await?;
                if let Some(span) = report.span {
                    self.cache.invalidate(span.earliest, span.latest).await?;
                }
            }
            Ok(snapshot)
        }

        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_scenario_statistics_without_filters_one_group_per_day() {
        let svc = service();
        svc.ingest(&ImportBatch::new(
            "a.nc",
            vec![np(1.0, 8.0, 50.0, at(5, 1)), np(3.0, 8.0, 50.0, at(5, 3))],
        ))
        .await
        .unwrap();

        let rows = svc
            .statistics(&PointFilter::all(), Granularity::Day, &Pagination::all())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.count == 1));
        assert_eq!(rows[0].interval_start, Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(rows[0].average, 1.0);
        assert_eq!(rows[1].interval_start, Utc.with_ymd_and_hms(2019, 5, 3, 0, 0, 0).unwrap());
        assert_eq!(rows[1].average, 3.0);
    }

    #[tokio::test]
    async fn test_scenario_empty_interval_is_empty_not_error() {
        let svc = service();
        svc.ingest(&ImportBatch::new(
            "a.nc",
            vec![
                np(1.0, 8.0, 50.0, at(5, 1)),
                np(2.0, 8.0, 50.0, at(5, 2)),
                np(3.0, 8.0, 50.0, at(5, 3)),
            ],
        ))
        .await
        .unwrap();

        let empty = PointFilter::builder().begin(at(5, 2)).end(at(5, 2)).build().unwrap();
        let all = Pagination::all();
        assert!(svc.points(&empty, &all).await.unwrap().is_empty());
        assert!(svc.daily_averages(&empty, &all).await.unwrap().is_empty());
        assert!(svc
            .statistics(&empty, Granularity::Day, &all)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_scenario_polygon_excluding_everything() {
        let svc = service();
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        let far = PointFilter::builder()
            .region(RegionSelector::Polygon(vec![(100.0, 10.0), (101.0, 10.0), (101.0, 11.0)]))
            .build()
            .unwrap();
        let fc = svc.points(&far, &Pagination::all()).await.unwrap();
        assert!(fc.is_empty());
        assert_eq!(serde_json::to_value(&fc).unwrap()["type"], "FeatureCollection");
    }

    #[tokio::test]
    async fn test_ingest_committed_during_read_is_not_cached() {
        let cache = Arc::new(InMemoryCache::new());
        let store = IngestMidRead::new(cache.clone());
        store
            .ingest(&ImportBatch::new("day1.nc", vec![np(1.0, 8.0, 50.0, at(5, 1))]))
            .await
            .unwrap();
        let svc = QueryService::new(store, cache);

        svc.store()
            .arm(ImportBatch::new("day3.nc", vec![np(3.0, 8.0, 50.0, at(5, 3))]));
        let first = svc.points(&PointFilter::all(), &Pagination::all()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(svc.store().stats().await.unwrap().points, 2);
        assert!(svc.cache().is_empty());

        let again = svc.points(&PointFilter::all(), &Pagination::all()).await.unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(svc.cache().len(), 1);

        // Same race through the aggregate path
        svc.store()
            .arm(ImportBatch::new("day4.nc", vec![np(4.0, 8.0, 50.0, at(5, 4))]));
        let rows = svc.daily_averages(&may(), &Pagination::all()).await.unwrap();
        assert_eq!(rows.len(), 2);
        let key = Fingerprint::of(&QueryKind::DailyAverage, &may(), &Pagination::all());
        assert!(!svc.cache().contains(&key));
        let rows = svc.daily_averages(&may(), &Pagination::all()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(svc.cache().contains(&key));
    }

    #[tokio::test]
    async fn test_scenario_ingest_then_query_after() {
        let svc = service();
        svc.ingest(&ImportBatch::new(
            "may.nc",
            vec![np(1.0, 8.0, 50.0, at(5, 2)), np(2.0, 8.0, 50.0, at(5, 20))],
        ))
        .await
        .unwrap();

        let fc = svc.points(&may(), &Pagination::all()).await.unwrap();
        assert_eq!(fc.len(), 2);
        let key = Fingerprint::of(&QueryKind::Points, &may(), &Pagination::all());
        assert!(svc.cache().contains(&key));
    }

    #[tokio::test]
    async fn test_scenario_overlapping_ingest_invalidates() {
        let svc = service();
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        assert_eq!(svc.points(&may(), &Pagination::all()).await.unwrap().len(), 1);

        svc.ingest(&ImportBatch::new("b.nc", vec![np(3.0, 8.0, 50.0, at(5, 15))]))
            .await
            .unwrap();
        let key = Fingerprint::of(&QueryKind::Points, &may(), &Pagination::all());
        assert!(!svc.cache().contains(&key));
        assert_eq!(svc.points(&may(), &Pagination::all()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_disjoint_ingest_keeps_entry() {
        let svc = service();
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        svc.points(&may(), &Pagination::all()).await.unwrap();

        svc.ingest(&ImportBatch::new("july.nc", vec![np(9.0, 8.0, 50.0, at(7, 1))]))
            .await
            .unwrap();
        let key = Fingerprint::of(&QueryKind::Points, &may(), &Pagination::all());
        assert!(svc.cache().contains(&key));
    }

    #[tokio::test]
    async fn test_scenario_unbounded_entry_invalidated_by_any_write() {
        let svc = service();
        svc.points(&PointFilter::all(), &Pagination::all()).await.unwrap();
        let key = Fingerprint::of(&QueryKind::Points, &PointFilter::all(), &Pagination::all());
        assert!(svc.cache().contains(&key));

        svc.ingest(&ImportBatch::new("late.nc", vec![np(1.0, 0.0, 0.0, at(12, 31))]))
            .await
            .unwrap();
        assert!(!svc.cache().contains(&key));
    }

    #[tokio::test]
    async fn test_scenario_pagination_is_part_of_key() {
        let svc = service();
        svc.ingest(&ImportBatch::new(
            "a.nc",
            vec![
                np(1.0, 8.0, 50.0, at(5, 2)),
                np(2.0, 8.0, 50.0, at(5, 3)),
                np(3.0, 8.0, 50.0, at(5, 4)),
            ],
        ))
        .await
        .unwrap();

        let first = svc.points(&may(), &Pagination::new(Some(1), None)).await.unwrap();
        let second = svc
            .points(&may(), &Pagination::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(first.features[0].properties.value, 1.0);
        assert_eq!(second.features[0].properties.value, 2.0);
        assert_eq!(svc.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_cached_response_is_served_without_store() {
        let svc = service();
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        let first = svc.points(&may(), &Pagination::all()).await.unwrap();

        // A raw insert bypasses invalidation, so a hit still returns the old view.
        svc.store().insert(&[np(5.0, 8.0, 50.0, at(5, 3))]).await.unwrap();
        let second = svc.points(&may(), &Pagination::all()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failing_cache_degrades_to_recompute() {
        let svc = QueryService::new(InMemoryStore::new(), FailingCache);
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        assert_eq!(svc.points(&may(), &Pagination::all()).await.unwrap().len(), 1);
        let rows = svc.daily_averages(&may(), &Pagination::all()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let svc = service();
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        let key = Fingerprint::of(&QueryKind::Points, &may(), &Pagination::all());
        let seen = svc.cache().generation().await.unwrap();
        svc.cache()
            .store(
                &key,
                CoveredInterval::unbounded(),
                Payload::from_bytes(b"garbage".to_vec()),
                seen,
            )
            .await
            .unwrap();
        assert_eq!(svc.points(&may(), &Pagination::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_import_leaves_cache_alone() {
        let svc = service();
        svc.ingest(&ImportBatch::new("a.nc", vec![np(1.0, 8.0, 50.0, at(5, 2))]))
            .await
            .unwrap();
        svc.points(&may(), &Pagination::all()).await.unwrap();

        let err = svc
            .ingest(&ImportBatch::new("a.nc", vec![np(2.0, 8.0, 50.0, at(5, 3))]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateImport(_)));
        assert_eq!(svc.cache().len(), 1);
        assert_eq!(svc.store().stats().await.unwrap().points, 1);
    }

    #[tokio::test]
    async fn test_statistics_over_region() {
        let svc = service();
        svc.ingest(&ImportBatch::new(
            "a.nc",
            vec![
                np(1.0, 8.0, 50.0, at(5, 2)),
                np(3.0, 8.5, 50.5, at(5, 2)),
                np(100.0, -70.0, -30.0, at(5, 2)),
            ],
        ))
        .await
        .unwrap();
        let filter = PointFilter::builder()
            .region(RegionSelector::Country("DE".into()))
            .build()
            .unwrap();
        let rows = svc
            .statistics(&filter, Granularity::Day, &Pagination::all())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].average, 2.0);
        assert!((rows[0].standard_deviation.unwrap() - 2f64.sqrt()).abs() < 1e-12);
    }
}
