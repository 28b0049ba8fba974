//! Deterministic cache keys for read requests.
//!
//! A [`Fingerprint`] is the SHA-256 of a canonical, versioned encoding of
//! everything that affects a response: the query kind (and granularity),
//! the resolved geometry, the distance, both time bounds, and pagination.
//!
//! Geometry is encoded from the *resolved* [`Geometry`](crate::geometry::Geometry),
//! so a country code and the equivalent bounding box share a key. Floats
//! are encoded by bit pattern (with `-0.0` folded into `0.0`) so no two
//! distinct values print alike.

use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::aggregate::Granularity;
use crate::filter::{Pagination, PointFilter, SpatialFilter};
use crate::geometry::Geometry;

/// Bump when the encoding or the payload format changes.
const ENCODING_VERSION: &str = "v1";

/// The result shape a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Points,
    DailyAverage,
    Statistics(Granularity),
}

/// Hex SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(kind: &QueryKind, filter: &PointFilter, page: &Pagination) -> Self {
        let canonical = canonical_form(kind, filter, page);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Wraps an already computed key, e.g. one read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn float(out: &mut String, x: f64) {
    let x = if x == 0.0 { 0.0 } else { x };
    let _ = write!(out, "{:016x}", x.to_bits());
}

fn instant(out: &mut String, ts: Option<DateTime<Utc>>) {
    match ts {
        Some(t) => {
            let _ = write!(out, "{}", t.timestamp_micros());
        }
        None => out.push('-'),
    }
}

fn geometry(out: &mut String, g: &Geometry) {
    out.push_str(match g {
        Geometry::Point(_) => "point(",
        Geometry::Polygon(_) => "polygon(",
    });
    for (i, c) in g.coords().iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        float(out, c.x);
        out.push(',');
        float(out, c.y);
    }
    out.push(')');
}

fn canonical_form(kind: &QueryKind, filter: &PointFilter, page: &Pagination) -> String {
    let mut out = String::with_capacity(128);
    out.push_str(ENCODING_VERSION);

    out.push_str("|kind=");
    match kind {
        QueryKind::Points => out.push_str("points"),
        QueryKind::DailyAverage => out.push_str("daily"),
        QueryKind::Statistics(g) => {
            out.push_str("statistics:");
            out.push_str(g.as_str());
        }
    }

    out.push_str("|spatial=");
    match filter.spatial() {
        None => out.push('-'),
        Some(SpatialFilter::Within(g)) => {
            out.push_str("within:");
            geometry(&mut out, g);
        }
        Some(SpatialFilter::DWithin { geometry: g, distance }) => {
            out.push_str("dwithin:");
            float(&mut out, *distance);
            out.push(':');
            geometry(&mut out, g);
        }
    }

    out.push_str("|begin=");
    instant(&mut out, filter.time().begin());
    out.push_str("|end=");
    instant(&mut out, filter.time().end());

    out.push_str("|limit=");
    match page.limit {
        Some(l) => {
            let _ = write!(out, "{}", l);
        }
        None => out.push('-'),
    }
    let _ = write!(out, "|offset={}", page.offset);
    out
}
