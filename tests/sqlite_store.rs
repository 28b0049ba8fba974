//! SQLite store and cache behavior against a real database file.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use emissions_api::config::Config;
use emissions_api::session::{storage_error, with_transaction};
use emissions_api::sqlite_cache::SqliteCache;
use emissions_api::sqlite_store::SqliteStore;
use emissions_api::{db, migrate};
use emissions_core::aggregate::{AggregateRows, AggregateSpec, Granularity};
use emissions_core::cache::{CoveredInterval, Payload, ResponseCache};
use emissions_core::filter::{Pagination, PointFilter, RegionSelector};
use emissions_core::fingerprint::Fingerprint;
use emissions_core::models::{ImportBatch, NewPoint};
use emissions_core::service::QueryService;
use emissions_core::store::Store;
use emissions_core::Error;

async fn setup() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("data/emissions.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, pool)
}

fn day(d: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(d)
}

fn np(value: f64, lon: f64, lat: f64, ts: DateTime<Utc>) -> NewPoint {
    NewPoint::new(value, lon, lat, ts)
}

/// Unconditional fill: reads the current generation and stores against it.
async fn put(cache: &SqliteCache, key: &Fingerprint, covered: CoveredInterval, payload: Payload) {
    let seen = cache.generation().await.unwrap();
    assert!(cache.store(key, covered, payload, seen).await.unwrap());
}

fn square(min: f64, max: f64) -> RegionSelector {
    RegionSelector::BoundingBox {
        min_lon: min,
        min_lat: min,
        max_lon: max,
        max_lat: max,
    }
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_tmp, pool) = setup().await;
    migrate::apply(&pool).await.unwrap();
    migrate::apply(&pool).await.unwrap();
}

#[tokio::test]
async fn test_points_come_back_in_insert_order_with_timestamps_intact() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    let precise = Utc.timestamp_micros(1_550_000_000_123_456).unwrap();
    store
        .insert(&[np(3.0, 1.0, 1.0, day(3)), np(1.0, 1.0, 1.0, day(1)), np(2.0, 1.0, 1.0, precise)])
        .await
        .unwrap();

    let points = store.query_points(&PointFilter::all(), &Pagination::all()).await.unwrap();
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![3.0, 1.0, 2.0]);
    assert_eq!(points[2].timestamp, precise);
    assert!(points.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn test_time_clause_is_half_open() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    store
        .insert(&[np(1.0, 0.0, 0.0, day(1)), np(2.0, 0.0, 0.0, day(2)), np(3.0, 0.0, 0.0, day(3))])
        .await
        .unwrap();
    let filter = PointFilter::builder().begin(day(1)).end(day(3)).build().unwrap();
    let values: Vec<f64> = store
        .query_points(&filter, &Pagination::all())
        .await
        .unwrap()
        .iter()
        .map(|p| p.value)
        .collect();
    assert_eq!(values, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_within_excludes_boundary_and_dwithin_includes_neighbours() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    store
        .insert(&[
            np(1.0, 1.0, 1.0, day(1)),  // inside
            np(2.0, 2.0, 1.0, day(1)),  // on the edge
            np(3.0, 2.3, 1.0, day(1)),  // 0.3 outside
            np(4.0, 10.0, 10.0, day(1)), // far away
        ])
        .await
        .unwrap();

    let within = PointFilter::builder().region(square(0.0, 2.0)).build().unwrap();
    let got: Vec<f64> = store
        .query_points(&within, &Pagination::all())
        .await
        .unwrap()
        .iter()
        .map(|p| p.value)
        .collect();
    assert_eq!(got, vec![1.0]);

    let near = PointFilter::builder()
        .region(square(0.0, 2.0))
        .distance(0.5)
        .build()
        .unwrap();
    let got: Vec<f64> = store
        .query_points(&near, &Pagination::all())
        .await
        .unwrap()
        .iter()
        .map(|p| p.value)
        .collect();
    assert_eq!(got, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_pagination_counts_matching_points_only() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    let mut points = Vec::new();
    for i in 0..10 {
        // Odd rows sit inside the prefilter box but on the polygon's far side
        let (lon, lat) = if i % 2 == 0 { (0.2, 0.2) } else { (0.9, 0.9) };
        points.push(np(i as f64, lon, lat, day(1)));
    }
    store.insert(&points).await.unwrap();

    let triangle = PointFilter::builder()
        .region(RegionSelector::Polygon(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]))
        .build()
        .unwrap();
    let page = store
        .query_points(&triangle, &Pagination::new(Some(2), Some(1)))
        .await
        .unwrap();
    let values: Vec<f64> = page.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![2.0, 4.0]);

    let all = store.query_points(&PointFilter::all(), &Pagination::new(None, Some(8))).await.unwrap();
    assert_eq!(all.len(), 2);
    let none = store.query_points(&PointFilter::all(), &Pagination::new(Some(0), None)).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_invalid_point_rejects_whole_batch() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    let err = store
        .insert(&[np(1.0, 0.0, 0.0, day(1)), np(1.0, 200.0, 0.0, day(1))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidMeasurement { index: 1, .. }));
    assert_eq!(store.stats().await.unwrap().points, 0);
}

#[tokio::test]
async fn test_duplicate_import_rolls_back() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    store
        .ingest(&ImportBatch::new("s5p-2019-01-01.csv", vec![np(1.0, 0.0, 0.0, day(1))]))
        .await
        .unwrap();
    assert!(store.has_imported("s5p-2019-01-01.csv").await.unwrap());

    let err = store
        .ingest(&ImportBatch::new(
            "s5p-2019-01-01.csv",
            vec![np(2.0, 0.0, 0.0, day(2)), np(3.0, 0.0, 0.0, day(3))],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateImport(ref f) if f == "s5p-2019-01-01.csv"));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.points, 1);
    assert_eq!(stats.imported_files, 1);
    assert!(matches!(
        store.mark_imported("s5p-2019-01-01.csv").await,
        Err(Error::DuplicateImport(_))
    ));
}

#[tokio::test]
async fn test_failed_transaction_leaves_nothing_behind() {
    let (_tmp, pool) = setup().await;
    let result: emissions_core::Result<()> = with_transaction(&pool, |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO imported_files (filename, imported_at) VALUES ('ghost.csv', 0)")
                .execute(&mut *conn)
                .await
                .map_err(storage_error)?;
            Err(Error::storage("simulated failure"))
        })
    })
    .await;
    assert!(result.is_err());

    let store = SqliteStore::new(pool);
    assert!(!store.has_imported("ghost.csv").await.unwrap());
}

#[tokio::test]
async fn test_ingest_drops_overlapping_cache_rows_in_same_transaction() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool.clone());
    let cache = SqliteCache::new(pool);

    let jan = Fingerprint::from_hex("jan");
    let feb = Fingerprint::from_hex("feb");
    let payload = Payload::from_bytes(b"[]".to_vec());
    put(&cache, &jan, CoveredInterval::new(Some(day(0)), Some(day(31))), payload.clone()).await;
    put(&cache, &feb, CoveredInterval::new(Some(day(31)), Some(day(59))), payload).await;

    store
        .ingest(&ImportBatch::new("jan.csv", vec![np(1.0, 0.0, 0.0, day(5))]))
        .await
        .unwrap();
    assert!(!cache.contains(&jan).await.unwrap());
    assert!(cache.contains(&feb).await.unwrap());
}

#[tokio::test]
async fn test_fill_computed_before_ingest_commit_is_refused() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool.clone());
    let cache = SqliteCache::new(pool);
    store
        .ingest(&ImportBatch::new("day1.csv", vec![np(1.0, 0.0, 0.0, day(1))]))
        .await
        .unwrap();

    // A reader takes the generation and its snapshot, then an ingest commits
    let seen = cache.generation().await.unwrap();
    let snapshot = store.query_points(&PointFilter::all(), &Pagination::all()).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    store
        .ingest(&ImportBatch::new("day3.csv", vec![np(3.0, 0.0, 0.0, day(3))]))
        .await
        .unwrap();
    assert!(cache.generation().await.unwrap() > seen);

    let key = Fingerprint::from_hex("all-points");
    let stored = cache
        .store(&key, CoveredInterval::unbounded(), Payload::from_bytes(b"stale".to_vec()), seen)
        .await
        .unwrap();
    assert!(!stored);
    assert!(!cache.contains(&key).await.unwrap());

    // Through the service the repeated request sees the new point
    let service = QueryService::new(SqliteStore::new(store.pool().clone()), cache);
    let fc = service.points(&PointFilter::all(), &Pagination::all()).await.unwrap();
    assert_eq!(fc.len(), 2);
}

#[tokio::test]
async fn test_invalidation_advances_generation_even_when_nothing_matches() {
    let (_tmp, pool) = setup().await;
    let cache = SqliteCache::new(pool);
    let before = cache.generation().await.unwrap();
    assert_eq!(cache.invalidate(day(1), day(2)).await.unwrap(), 0);
    assert_eq!(cache.generation().await.unwrap(), before.next());
}

#[tokio::test]
async fn test_sql_invalidation_matches_overlap_rule() {
    let (_tmp, pool) = setup().await;
    let cache = SqliteCache::new(pool);

    let bounds: Vec<Option<i64>> = std::iter::once(None).chain((0..4).map(Some)).collect();
    let mut entries = Vec::new();
    for &b in &bounds {
        for &e in &bounds {
            let key = Fingerprint::from_hex(format!("{:?}-{:?}", b, e));
            entries.push((key, CoveredInterval::new(b.map(day), e.map(day))));
        }
    }

    for x in 0..4 {
        for y in x..4 {
            for (key, covered) in &entries {
                put(&cache, key, *covered, Payload::from_bytes(vec![1])).await;
            }
            let removed = cache.invalidate(day(x), day(y)).await.unwrap();

            let mut expected_removed = 0;
            for (key, covered) in &entries {
                let overlaps = covered.overlaps(day(x), day(y));
                if overlaps {
                    expected_removed += 1;
                }
                assert_eq!(
                    cache.contains(key).await.unwrap(),
                    !overlaps,
                    "entry {} window {}..{}",
                    key,
                    x,
                    y
                );
            }
            assert_eq!(removed, expected_removed);
        }
    }
}

#[tokio::test]
async fn test_cache_store_replaces_and_lookup_round_trips() {
    let (_tmp, pool) = setup().await;
    let cache = SqliteCache::new(pool);
    let key = Fingerprint::from_hex("k");
    assert!(cache.lookup(&key).await.unwrap().is_none());

    put(&cache, &key, CoveredInterval::unbounded(), Payload::from_bytes(b"one".to_vec())).await;
    put(&cache, &key, CoveredInterval::new(Some(day(1)), None), Payload::from_bytes(b"two".to_vec())).await;
    assert_eq!(cache.len().await.unwrap(), 1);
    assert_eq!(
        cache.lookup(&key).await.unwrap(),
        Some(Payload::from_bytes(b"two".to_vec()))
    );
}

#[tokio::test]
async fn test_aggregates_over_sqlite() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    let t = |d: u32, h: u32| Utc.with_ymd_and_hms(2019, 4, d, h, 0, 0).unwrap();
    store
        .insert(&[
            np(1.0, 0.0, 0.0, t(1, 1)),
            np(3.0, 0.0, 0.0, t(1, 23)),
            np(10.0, 0.0, 0.0, t(2, 12)),
        ])
        .await
        .unwrap();

    match store
        .aggregate(&PointFilter::all(), &AggregateSpec::DailyAverage, &Pagination::all())
        .await
        .unwrap()
    {
        AggregateRows::Daily(rows) => {
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].average, 2.0);
            assert_eq!(rows[0].min_time, t(1, 1));
            assert_eq!(rows[0].max_time, t(1, 23));
        }
        other => panic!("unexpected: {:?}", other),
    }

    match store
        .aggregate(
            &PointFilter::all(),
            &AggregateSpec::Statistics(Granularity::Month),
            &Pagination::all(),
        )
        .await
        .unwrap()
    {
        AggregateRows::Statistics(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].count, 3);
            assert_eq!(rows[0].min, 1.0);
            assert_eq!(rows[0].max, 10.0);
            assert_eq!(rows[0].interval_start, Utc.with_ymd_and_hms(2019, 4, 1, 0, 0, 0).unwrap());
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_service_over_sqlite_invalidates_after_ingest() {
    let (_tmp, pool) = setup().await;
    let service = QueryService::new(SqliteStore::new(pool.clone()), SqliteCache::new(pool));
    let january = PointFilter::builder().begin(day(0)).end(day(31)).build().unwrap();

    service
        .ingest(&ImportBatch::new("a.csv", vec![np(1.0, 0.0, 0.0, day(2))]))
        .await
        .unwrap();
    assert_eq!(service.points(&january, &Pagination::all()).await.unwrap().len(), 1);
    assert_eq!(service.cache().len().await.unwrap(), 1);

    service
        .ingest(&ImportBatch::new("b.csv", vec![np(2.0, 0.0, 0.0, day(3))]))
        .await
        .unwrap();
    assert_eq!(service.cache().len().await.unwrap(), 0);
    assert_eq!(service.points(&january, &Pagination::all()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_scenario_statistics_without_filters_over_sqlite() {
    let (_tmp, pool) = setup().await;
    let service = QueryService::new(SqliteStore::new(pool.clone()), SqliteCache::new(pool));
    service
        .ingest(&ImportBatch::new(
            "days.csv",
            vec![np(1.0, 5.0, 5.0, day(1)), np(3.0, 5.0, 5.0, day(3))],
        ))
        .await
        .unwrap();

    let rows = service
        .statistics(&PointFilter::all(), Granularity::Day, &Pagination::all())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.count == 1));
    assert_eq!(rows[0].interval_start, day(1));
    assert_eq!(rows[1].interval_start, day(3));
    assert!(rows.iter().all(|r| r.standard_deviation.is_none()));
}

#[tokio::test]
async fn test_scenario_empty_interval_over_sqlite() {
    let (_tmp, pool) = setup().await;
    let service = QueryService::new(SqliteStore::new(pool.clone()), SqliteCache::new(pool));
    service
        .ingest(&ImportBatch::new(
            "days.csv",
            vec![np(1.0, 5.0, 5.0, day(1)), np(2.0, 5.0, 5.0, day(2)), np(3.0, 5.0, 5.0, day(3))],
        ))
        .await
        .unwrap();

    let empty = PointFilter::builder().begin(day(2)).end(day(2)).build().unwrap();
    let all = Pagination::all();
    assert!(service.points(&empty, &all).await.unwrap().is_empty());
    assert!(service.daily_averages(&empty, &all).await.unwrap().is_empty());
    assert!(service
        .statistics(&empty, Granularity::Day, &all)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_streamed_aggregate_applies_exact_spatial_predicate() {
    let (_tmp, pool) = setup().await;
    let store = SqliteStore::new(pool);
    // Triangle over (0,0) (4,0) (0,4): (3,3) lies in its bounding box but not inside
    store
        .insert(&[
            np(2.0, 1.0, 1.0, day(1)),
            np(4.0, 1.0, 2.0, day(1)),
            np(100.0, 3.0, 3.0, day(1)),
            np(7.0, 1.0, 1.0, day(2)),
        ])
        .await
        .unwrap();
    let filter = PointFilter::builder()
        .region(RegionSelector::Polygon(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)]))
        .build()
        .unwrap();

    let rows = store
        .aggregate(&filter, &AggregateSpec::DailyAverage, &Pagination::new(Some(1), None))
        .await
        .unwrap();
    match rows {
        AggregateRows::Daily(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].average, 3.0);
        }
        other => panic!("unexpected: {:?}", other),
    }
}
