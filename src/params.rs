//! Request parameters shared by the HTTP query string and the CLI flags.
//!
//! Every field arrives as text so that a malformed value is reported as
//! [`Error::InvalidFilterParameter`] naming the offending field, whether it
//! came from `?limit=abc` or `--limit abc`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use emissions_core::aggregate::Granularity;
use emissions_core::filter::{Pagination, PointFilter, RegionSelector};
use emissions_core::{Error, Result};

#[derive(Debug, Default, Clone, Deserialize, clap::Args)]
pub struct QueryParams {
    /// ISO 3166-1 alpha-2 country code, e.g. `DE`.
    #[arg(long)]
    pub country: Option<String>,

    /// Bounding box `min_lon,min_lat,max_lon,max_lat`.
    #[arg(long, allow_hyphen_values = true)]
    pub geoframe: Option<String>,

    /// Polygon vertices `lon,lat,lon,lat,...` (at least three pairs).
    #[arg(long, allow_hyphen_values = true)]
    pub polygon: Option<String>,

    /// Single location `lon,lat`.
    #[arg(long, allow_hyphen_values = true)]
    pub point: Option<String>,

    /// Match points within this many degrees of the region.
    #[arg(long)]
    pub distance: Option<String>,

    /// Inclusive lower time bound.
    #[arg(long)]
    pub begin: Option<String>,

    /// Exclusive upper time bound.
    #[arg(long)]
    pub end: Option<String>,

    #[arg(long)]
    pub limit: Option<String>,

    #[arg(long)]
    pub offset: Option<String>,
}

impl QueryParams {
    /// Resolves the region (precedence: geoframe, country, polygon, point)
    /// and time bounds into a [`PointFilter`].
    pub fn filter(&self) -> Result<PointFilter> {
        let mut builder = PointFilter::builder();
        if let Some(region) = self.region()? {
            builder = builder.region(region);
        }
        if let Some(d) = non_empty(&self.distance) {
            builder = builder.distance(parse_f64("distance", d)?);
        }
        if let Some(b) = non_empty(&self.begin) {
            builder = builder.begin(parse_datetime("begin", b)?);
        }
        if let Some(e) = non_empty(&self.end) {
            builder = builder.end(parse_datetime("end", e)?);
        }
        builder.build()
    }

    pub fn pagination(&self) -> Result<Pagination> {
        let limit = non_empty(&self.limit)
            .map(|l| parse_u64("limit", l))
            .transpose()?;
        let offset = non_empty(&self.offset)
            .map(|o| parse_u64("offset", o))
            .transpose()?;
        Ok(Pagination::new(limit, offset))
    }

    fn region(&self) -> Result<Option<RegionSelector>> {
        if let Some(g) = non_empty(&self.geoframe) {
            let v = parse_floats("geoframe", g)?;
            if v.len() != 4 {
                return Err(Error::invalid(
                    "geoframe",
                    format!("expected 4 numbers, got {}", v.len()),
                ));
            }
            return Ok(Some(RegionSelector::BoundingBox {
                min_lon: v[0],
                min_lat: v[1],
                max_lon: v[2],
                max_lat: v[3],
            }));
        }
        if let Some(c) = non_empty(&self.country) {
            return Ok(Some(RegionSelector::Country(c.to_string())));
        }
        if let Some(p) = non_empty(&self.polygon) {
            let v = parse_floats("polygon", p)?;
            if v.len() % 2 != 0 {
                return Err(Error::invalid(
                    "polygon",
                    "expected an even number of coordinates",
                ));
            }
            let vertices = v.chunks(2).map(|c| (c[0], c[1])).collect();
            return Ok(Some(RegionSelector::Polygon(vertices)));
        }
        if let Some(p) = non_empty(&self.point) {
            let v = parse_floats("point", p)?;
            if v.len() != 2 {
                return Err(Error::invalid(
                    "point",
                    format!("expected 2 numbers, got {}", v.len()),
                ));
            }
            return Ok(Some(RegionSelector::Point {
                lon: v[0],
                lat: v[1],
            }));
        }
        Ok(None)
    }
}

/// `?interval=` of the statistics endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalParam {
    pub interval: Option<String>,
}

impl IntervalParam {
    /// Defaults to `day` when absent.
    pub fn granularity(&self) -> Result<Granularity> {
        match non_empty(&self.interval) {
            Some(s) => s.parse(),
            None => Ok(Granularity::Day),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(field: &'static str, s: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|_| Error::invalid(field, format!("not a number: '{}'", s)))
}

fn parse_u64(field: &'static str, s: &str) -> Result<u64> {
    s.parse::<u64>()
        .map_err(|_| Error::invalid(field, format!("not a non-negative integer: '{}'", s)))
}

fn parse_floats(field: &'static str, s: &str) -> Result<Vec<f64>> {
    s.split(',').map(|part| parse_f64(field, part.trim())).collect()
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`; naive values
/// are taken as UTC.
pub fn parse_datetime(field: &'static str, s: &str) -> Result<DateTime<Utc>> {
    let ts = parse_any(s).ok_or_else(|| Error::invalid(field, format!("invalid date: '{}'", s)))?;
    // Stored timestamps and cache keys are whole microseconds
    if ts.timestamp_subsec_nanos() % 1_000 != 0 {
        return Err(Error::invalid(
            field,
            format!("'{}' is finer than microsecond precision", s),
        ));
    }
    Ok(ts)
}

fn parse_any(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use emissions_core::filter::SpatialFilter;
    use emissions_core::geometry::Geometry;

    fn params() -> QueryParams {
        QueryParams::default()
    }

    #[test]
    fn test_date_formats() {
        let expected = Utc.with_ymd_and_hms(2019, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(parse_datetime("begin", "2019-02-03T04:05:06Z").unwrap(), expected);
        assert_eq!(parse_datetime("begin", "2019-02-03T05:05:06+01:00").unwrap(), expected);
        assert_eq!(parse_datetime("begin", "2019-02-03T04:05:06").unwrap(), expected);
        assert_eq!(
            parse_datetime("begin", "2019-02-03").unwrap(),
            Utc.with_ymd_and_hms(2019, 2, 3, 0, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_datetime("end", "yesterday"),
            Err(Error::InvalidFilterParameter { field: "end", .. })
        ));
    }

    #[test]
    fn test_sub_microsecond_timestamps_rejected() {
        let micros = parse_datetime("begin", "2019-02-03T04:05:06.000001Z").unwrap();
        assert_eq!(micros.timestamp_subsec_micros(), 1);
        assert_eq!(
            parse_datetime("begin", "2019-02-03T04:05:06.123456").unwrap().timestamp_subsec_nanos(),
            123_456_000
        );
        for s in ["2019-02-03T04:05:06.0000005Z", "2019-02-03T04:05:06.0000005"] {
            assert!(matches!(
                parse_datetime("begin", s),
                Err(Error::InvalidFilterParameter { field: "begin", .. })
            ));
        }

        let p = QueryParams {
            end: Some("2019-02-03 00:00:00.000000001".into()),
            ..params()
        };
        assert!(matches!(
            p.filter(),
            Err(Error::InvalidFilterParameter { field: "end", .. })
        ));
    }

    #[test]
    fn test_geoframe_wins_over_country() {
        let p = QueryParams {
            geoframe: Some("0,0,1,1".into()),
            country: Some("DE".into()),
            ..params()
        };
        let f = p.filter().unwrap();
        let b = f.spatial().unwrap().geometry().bounds();
        assert_eq!((b.min_lon, b.max_lat), (0.0, 1.0));
    }

    #[test]
    fn test_point_with_distance_is_dwithin() {
        let p = QueryParams {
            point: Some("8.4,49.0".into()),
            distance: Some("0.5".into()),
            ..params()
        };
        match p.filter().unwrap().spatial() {
            Some(SpatialFilter::DWithin { geometry: Geometry::Point(c), distance }) => {
                assert_eq!((c.x, c.y, *distance), (8.4, 49.0, 0.5));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_bad_values_name_their_field() {
        let cases = [
            (QueryParams { geoframe: Some("0,0,1".into()), ..params() }, "geoframe"),
            (QueryParams { polygon: Some("0,0,1,1,2".into()), ..params() }, "polygon"),
            (QueryParams { point: Some("a,b".into()), ..params() }, "point"),
            (QueryParams { country: Some("XX".into()), ..params() }, "country"),
            (QueryParams { begin: Some("nope".into()), ..params() }, "begin"),
        ];
        for (p, field) in cases {
            match p.filter() {
                Err(Error::InvalidFilterParameter { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{}: unexpected {:?}", field, other),
            }
        }
        let p = QueryParams { limit: Some("-1".into()), ..params() };
        assert!(matches!(
            p.pagination(),
            Err(Error::InvalidFilterParameter { field: "limit", .. })
        ));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let p = QueryParams {
            country: Some("  ".into()),
            limit: Some("".into()),
            ..params()
        };
        assert!(p.filter().unwrap().spatial().is_none());
        assert_eq!(p.pagination().unwrap(), Pagination::all());
    }

    #[test]
    fn test_interval_defaults_to_day() {
        assert_eq!(IntervalParam { interval: None }.granularity().unwrap(), Granularity::Day);
        assert_eq!(
            IntervalParam { interval: Some("WEEK".into()) }.granularity().unwrap(),
            Granularity::Week
        );
        assert!(IntervalParam { interval: Some("fortnight".into()) }.granularity().is_err());
    }
}
