//! Filter builder for point queries.
//!
//! A [`PointFilter`] is a conjunction of optional clauses:
//!
//! - **spatial**: strict containment in a geometry, or proximity within a
//!   distance of it (mutually exclusive, chosen by whether a distance is set);
//! - **temporal**: `begin <= timestamp < end`, either bound optional.
//!
//! [`Pagination`] is kept separate because it applies after filtering (and,
//! for aggregates, after grouping) over the store's primary-key order.
//!
//! ```rust
//! use emissions_core::filter::{PointFilter, RegionSelector};
//!
//! let filter = PointFilter::builder()
//!     .region(RegionSelector::Country("DE".into()))
//!     .build()
//!     .unwrap();
//! assert!(filter.spatial().is_some());
//! ```

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Coord, Geometry, Polygon};
use crate::models::MeasurementPoint;
use crate::regions;

/// The ways a caller can name a region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSelector {
    /// ISO 3166-1 alpha-2 code, resolved through [`regions::country_bounds`].
    Country(String),
    BoundingBox {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
    /// Polygon vertices as `(lon, lat)`; the ring is closed automatically.
    Polygon(Vec<(f64, f64)>),
    Point { lon: f64, lat: f64 },
}

impl RegionSelector {
    /// The request parameter this selector came from, for error reporting.
    pub fn field(&self) -> &'static str {
        match self {
            RegionSelector::Country(_) => "country",
            RegionSelector::BoundingBox { .. } => "geoframe",
            RegionSelector::Polygon(_) => "polygon",
            RegionSelector::Point { .. } => "point",
        }
    }

    pub fn resolve(&self) -> Result<Geometry> {
        let field = self.field();
        match self {
            RegionSelector::Country(code) => regions::country_bounds(code)
                .map(|b| Geometry::Polygon(Polygon::from_bbox(&b)))
                .ok_or_else(|| Error::invalid(field, format!("unknown country code '{}'", code))),
            RegionSelector::BoundingBox {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => BoundingBox::new(*min_lon, *min_lat, *max_lon, *max_lat)
                .map(|b| Geometry::Polygon(Polygon::from_bbox(&b)))
                .map_err(|m| Error::invalid(field, m)),
            RegionSelector::Polygon(vertices) => Polygon::new(vertices)
                .map(Geometry::Polygon)
                .map_err(|m| Error::invalid(field, m)),
            RegionSelector::Point { lon, lat } => {
                Geometry::point(*lon, *lat).map_err(|m| Error::invalid(field, m))
            }
        }
    }
}

/// Spatial clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialFilter {
    /// Point strictly inside the geometry.
    Within(Geometry),
    /// Point within `distance` degrees of the geometry, boundary included.
    DWithin { geometry: Geometry, distance: f64 },
}

impl SpatialFilter {
    pub fn new(geometry: Geometry, distance: Option<f64>) -> Result<Self> {
        match distance {
            None => Ok(SpatialFilter::Within(geometry)),
            Some(d) if d.is_finite() && d >= 0.0 => Ok(SpatialFilter::DWithin {
                geometry,
                distance: d,
            }),
            Some(d) => Err(Error::invalid(
                "distance",
                format!("must be a finite non-negative number, got {}", d),
            )),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        match self {
            SpatialFilter::Within(g) => g,
            SpatialFilter::DWithin { geometry, .. } => geometry,
        }
    }

    pub fn distance(&self) -> Option<f64> {
        match self {
            SpatialFilter::Within(_) => None,
            SpatialFilter::DWithin { distance, .. } => Some(*distance),
        }
    }

    pub fn matches(&self, c: &Coord) -> bool {
        match self {
            SpatialFilter::Within(g) => g.contains_strictly(c),
            SpatialFilter::DWithin { geometry, distance } => geometry.distance_to(c) <= *distance,
        }
    }

    /// Box every matching point lies in. Backends use it as an index-friendly
    /// prefilter before applying [`matches`](Self::matches).
    pub fn prefilter(&self) -> BoundingBox {
        let bounds = self.geometry().bounds();
        match self.distance() {
            None => bounds,
            Some(d) => bounds.expand(d),
        }
    }
}

/// Half-open time interval `[begin, end)`; `None` leaves a side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    begin: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// `begin == end` is a valid empty range; `begin > end` is rejected, as
    /// is a bound finer than a microsecond.
    pub fn new(begin: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        whole_micros("begin", begin)?;
        whole_micros("end", end)?;
        if let (Some(b), Some(e)) = (begin, end) {
            if b > e {
                return Err(Error::invalid(
                    "begin",
                    format!("begin {} is after end {}", b.to_rfc3339(), e.to_rfc3339()),
                ));
            }
        }
        Ok(Self { begin, end })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Option<DateTime<Utc>> {
        self.begin
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.begin.map_or(true, |b| *ts >= b) && self.end.map_or(true, |e| *ts < e)
    }

    /// True when no instant can satisfy the range.
    pub fn is_empty(&self) -> bool {
        matches!((self.begin, self.end), (Some(b), Some(e)) if b >= e)
    }
}

fn whole_micros(field: &'static str, ts: Option<DateTime<Utc>>) -> Result<()> {
    match ts {
        Some(t) if t.timestamp_subsec_nanos() % 1_000 != 0 => Err(Error::invalid(
            field,
            format!("{} is finer than microsecond precision", t.to_rfc3339()),
        )),
        _ => Ok(()),
    }
}

/// `limit` rows after skipping `offset`, over the stable order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Pagination {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none() && self.offset == 0
    }

    /// Applies offset then limit to an already ordered sequence.
    pub fn apply<I: Iterator>(&self, iter: I) -> impl Iterator<Item = I::Item> {
        let limit = self
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        iter.skip(usize::try_from(self.offset).unwrap_or(usize::MAX))
            .take(limit)
    }
}

/// Conjunction of the optional spatial and temporal clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointFilter {
    spatial: Option<SpatialFilter>,
    time: TimeRange,
}

impl PointFilter {
    pub fn builder() -> PointFilterBuilder {
        PointFilterBuilder::default()
    }

    /// Matches every point.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn spatial(&self) -> Option<&SpatialFilter> {
        self.spatial.as_ref()
    }

    pub fn time(&self) -> &TimeRange {
        &self.time
    }

    pub fn matches(&self, p: &MeasurementPoint) -> bool {
        if !self.time.contains(&p.timestamp) {
            return false;
        }
        match &self.spatial {
            Some(s) => s.matches(&Coord::new(p.location.longitude(), p.location.latitude())),
            None => true,
        }
    }
}

/// Collects raw clause inputs; [`build`](Self::build) validates them together.
#[derive(Debug, Clone, Default)]
pub struct PointFilterBuilder {
    region: Option<RegionSelector>,
    distance: Option<f64>,
    begin: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl PointFilterBuilder {
    pub fn region(mut self, region: RegionSelector) -> Self {
        self.region = Some(region);
        self
    }

    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn begin(mut self, begin: DateTime<Utc>) -> Self {
        self.begin = Some(begin);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn build(self) -> Result<PointFilter> {
        let spatial = match self.region {
            Some(region) => Some(SpatialFilter::new(region.resolve()?, self.distance)?),
            None if self.distance.is_some() => {
                return Err(Error::invalid(
                    "distance",
                    "a distance requires a region (country, geoframe, polygon or point)",
                ))
            }
            None => None,
        };
        let time = TimeRange::new(self.begin, self.end)?;
        Ok(PointFilter { spatial, time })
    }
}
