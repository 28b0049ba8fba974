//! Planar geometry over longitude/latitude degrees.
//!
//! Predicates mirror the PostGIS functions the filters are defined by:
//!
//! | Method | PostGIS | Boundary |
//! |--------|---------|----------|
//! | [`Geometry::contains_strictly`] | `ST_Within(point, geom)` | excluded |
//! | [`Geometry::distance_to`] ≤ d | `ST_DWithin(point, geom, d)` | included |
//!
//! Distances are Cartesian in degrees, like `ST_DWithin` on geometries
//! without a projected SRID. No geodesic correction is applied.

use std::fmt;

/// A `(longitude, latitude)` coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Coord) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned bounds, inclusive on every side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, String> {
        check_coord(min_lon, min_lat)?;
        check_coord(max_lon, max_lat)?;
        if min_lon >= max_lon {
            return Err(format!(
                "min longitude {} must be less than max longitude {}",
                min_lon, max_lon
            ));
        }
        if min_lat >= max_lat {
            return Err(format!(
                "min latitude {} must be less than max latitude {}",
                min_lat, max_lat
            ));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Grows the box by `d` on every side. The result may exceed valid
    /// coordinate ranges; it is only used as a prefilter.
    pub fn expand(&self, d: f64) -> Self {
        Self {
            min_lon: self.min_lon - d,
            min_lat: self.min_lat - d,
            max_lon: self.max_lon + d,
            max_lat: self.max_lat + d,
        }
    }

    pub fn contains(&self, c: &Coord) -> bool {
        c.x >= self.min_lon && c.x <= self.max_lon && c.y >= self.min_lat && c.y <= self.max_lat
    }
}

fn check_coord(lon: f64, lat: f64) -> Result<(), String> {
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude {} outside [-180, 180]", lon));
    }
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {} outside [-90, 90]", lat));
    }
    Ok(())
}

/// A simple polygon stored as a closed ring (first vertex repeated last).
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<Coord>,
}

impl Polygon {
    /// Builds a polygon from its vertices. The ring is closed automatically;
    /// an explicitly closed ring is accepted as well.
    pub fn new(vertices: &[(f64, f64)]) -> Result<Self, String> {
        let mut ring: Vec<Coord> = Vec::with_capacity(vertices.len() + 1);
        for &(lon, lat) in vertices {
            check_coord(lon, lat)?;
            ring.push(Coord::new(lon, lat));
        }
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                ring.len()
            ));
        }
        ring.push(ring[0]);
        Ok(Self { ring })
    }

    pub fn from_bbox(b: &BoundingBox) -> Self {
        let ring = vec![
            Coord::new(b.min_lon, b.min_lat),
            Coord::new(b.max_lon, b.min_lat),
            Coord::new(b.max_lon, b.max_lat),
            Coord::new(b.min_lon, b.max_lat),
            Coord::new(b.min_lon, b.min_lat),
        ];
        Self { ring }
    }

    /// The closed ring, first vertex repeated at the end.
    pub fn ring(&self) -> &[Coord] {
        &self.ring
    }

    fn edges(&self) -> impl Iterator<Item = (&Coord, &Coord)> {
        self.ring.windows(2).map(|w| (&w[0], &w[1]))
    }

    fn bounds(&self) -> BoundingBox {
        let mut b = BoundingBox {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for c in &self.ring {
            b.min_lon = b.min_lon.min(c.x);
            b.min_lat = b.min_lat.min(c.y);
            b.max_lon = b.max_lon.max(c.x);
            b.max_lat = b.max_lat.max(c.y);
        }
        b
    }

    fn on_boundary(&self, p: &Coord) -> bool {
        self.edges().any(|(a, b)| on_segment(p, a, b))
    }

    /// Even-odd ray cast. Boundary points are handled by the caller.
    fn ray_cast(&self, p: &Coord) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn contains_strictly(&self, p: &Coord) -> bool {
        !self.on_boundary(p) && self.ray_cast(p)
    }

    fn distance_to(&self, p: &Coord) -> f64 {
        if self.ray_cast(p) {
            return 0.0;
        }
        self.edges()
            .map(|(a, b)| segment_distance(p, a, b))
            .fold(f64::INFINITY, f64::min)
    }
}

fn on_segment(p: &Coord, a: &Coord, b: &Coord) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross != 0.0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segment_distance(p: &Coord, a: &Coord, b: &Coord) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(&Coord::new(a.x + t * dx, a.y + t * dy))
}

/// Filter geometry: a region polygon or a single reference point.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    Polygon(Polygon),
}

impl Geometry {
    pub fn point(lon: f64, lat: f64) -> Result<Self, String> {
        check_coord(lon, lat)?;
        Ok(Geometry::Point(Coord::new(lon, lat)))
    }

    /// `ST_Within(p, self)`: interior only. A point is "within" a point
    /// geometry only when the two coincide.
    pub fn contains_strictly(&self, p: &Coord) -> bool {
        match self {
            Geometry::Point(c) => c == p,
            Geometry::Polygon(poly) => poly.contains_strictly(p),
        }
    }

    /// Planar distance in degrees; zero inside or on a polygon.
    pub fn distance_to(&self, p: &Coord) -> f64 {
        match self {
            Geometry::Point(c) => c.distance(p),
            Geometry::Polygon(poly) => poly.distance_to(p),
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        match self {
            Geometry::Point(c) => BoundingBox {
                min_lon: c.x,
                min_lat: c.y,
                max_lon: c.x,
                max_lat: c.y,
            },
            Geometry::Polygon(poly) => poly.bounds(),
        }
    }

    /// Every coordinate in a fixed order; used for fingerprinting.
    pub fn coords(&self) -> &[Coord] {
        match self {
            Geometry::Point(c) => std::slice::from_ref(c),
            Geometry::Polygon(poly) => poly.ring(),
        }
    }
}

/// Renders WKT, e.g. `POLYGON((0 0,1 0,1 1,0 0))`.
impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point(c) => write!(f, "POINT({} {})", c.x, c.y),
            Geometry::Polygon(poly) => {
                f.write_str("POLYGON((")?;
                for (i, c) in poly.ring().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{} {}", c.x, c.y)?;
                }
                f.write_str("))")
            }
        }
    }
}
