//! Core data models: stored points, ingest batches, and the result records
//! returned by the read path.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A validated longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    longitude: f64,
    latitude: f64,
}

impl Location {
    /// Fails unless `longitude ∈ [-180, 180]` and `latitude ∈ [-90, 90]`.
    pub fn new(longitude: f64, latitude: f64) -> std::result::Result<Self, String> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("longitude {} outside [-180, 180]", longitude));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("latitude {} outside [-90, 90]", latitude));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }
}

/// A stored measurement. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    /// Surrogate key assigned by the store; defines the stable row order.
    pub id: i64,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub location: Location,
}

/// One `(value, longitude, latitude, timestamp)` tuple from an import driver.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPoint {
    pub value: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl NewPoint {
    pub fn new(value: f64, longitude: f64, latitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            longitude,
            latitude,
            timestamp,
        }
    }
}

/// Closed range of timestamps touched by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl TimeSpan {
    /// Smallest span containing every timestamp, or `None` when empty.
    pub fn covering<I>(timestamps: I) -> Option<Self>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        timestamps.into_iter().fold(None, |span, ts| match span {
            None => Some(TimeSpan {
                earliest: ts,
                latest: ts,
            }),
            Some(s) => Some(TimeSpan {
                earliest: s.earliest.min(ts),
                latest: s.latest.max(ts),
            }),
        })
    }
}

/// A batch handed to [`Store::ingest`](crate::store::Store::ingest).
///
/// When `source` is set, the filename is recorded in the import ledger in
/// the same transaction as the points, so a file is ingested at most once.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub source: Option<String>,
    pub points: Vec<NewPoint>,
}

impl ImportBatch {
    pub fn new(source: impl Into<String>, points: Vec<NewPoint>) -> Self {
        Self {
            source: Some(source.into()),
            points,
        }
    }

    pub fn anonymous(points: Vec<NewPoint>) -> Self {
        Self {
            source: None,
            points,
        }
    }

    /// Rejects the whole batch on the first bad row.
    pub fn validate(&self) -> Result<()> {
        if let Some(source) = &self.source {
            if source.trim().is_empty() {
                return Err(Error::invalid("source", "filename must not be empty"));
            }
        }
        for (index, p) in self.points.iter().enumerate() {
            if !p.value.is_finite() {
                return Err(Error::InvalidMeasurement {
                    index,
                    message: format!("value {} is not finite", p.value),
                });
            }
            Location::new(p.longitude, p.latitude)
                .map_err(|message| Error::InvalidMeasurement { index, message })?;
        }
        Ok(())
    }

    pub fn span(&self) -> Option<TimeSpan> {
        TimeSpan::covering(self.points.iter().map(|p| p.timestamp))
    }
}

/// Outcome of a committed ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub source: Option<String>,
    pub inserted: u64,
    /// `None` for an empty batch: nothing to invalidate.
    pub span: Option<TimeSpan>,
}

/// Summary counters used by `emissions stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub points: i64,
    pub imported_files: i64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

// ============ Result records ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum CollectionType {
    FeatureCollection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum FeatureType {
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum GeometryType {
    Point,
}

/// GeoJSON `FeatureCollection` of measurement points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: CollectionType,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: CollectionType::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<MeasurementPoint>> for FeatureCollection {
    fn from(points: Vec<MeasurementPoint>) -> Self {
        FeatureCollection::new(points.iter().map(Feature::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: FeatureType,
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

impl From<&MeasurementPoint> for Feature {
    fn from(p: &MeasurementPoint) -> Self {
        Feature {
            kind: FeatureType::Feature,
            geometry: PointGeometry {
                kind: GeometryType::Point,
                coordinates: [p.location.longitude(), p.location.latitude()],
            },
            properties: FeatureProperties {
                value: p.value,
                timestamp: p.timestamp,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    kind: GeometryType,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// One row of the fixed daily-average view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAverage {
    pub average: f64,
    pub max_time: DateTime<Utc>,
    pub min_time: DateTime<Utc>,
    pub day: NaiveDate,
}

/// One group of the statistics view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub count: u64,
    pub average: f64,
    /// Sample standard deviation; `None` for single-point groups.
    pub standard_deviation: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub min_time: DateTime<Utc>,
    pub max_time: DateTime<Utc>,
    pub interval_start: DateTime<Utc>,
}
