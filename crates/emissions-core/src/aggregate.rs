//! Grouped aggregates over filtered points.
//!
//! Two fixed shapes:
//!
//! - [`daily_averages`]: one [`DailyAverage`] per calendar day (UTC, no
//!   timezone conversion);
//! - [`statistics`]: one [`StatisticsRow`] per [`Granularity`] bucket with
//!   count, mean, sample standard deviation, extrema, and time bounds.
//!
//! Buckets are emitted in ascending order so pagination over groups is
//! stable. Truncation follows PostgreSQL `date_trunc`, including its
//! `century`/`millennium` convention of starting at year `xx01`.
//!
//! Standard deviation uses Welford's online update and the `n - 1` divisor.
//! A group holding one point has no sample deviation and reports `None`,
//! matching `stddev()` returning NULL in PostgreSQL.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::Error;
use crate::filter::Pagination;
use crate::models::{DailyAverage, MeasurementPoint, StatisticsRow};

/// Bucket width for [`statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Microseconds,
    Milliseconds,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    Decade,
    Century,
    Millennium,
}

impl Granularity {
    pub const ALL: [Granularity; 13] = [
        Granularity::Microseconds,
        Granularity::Milliseconds,
        Granularity::Second,
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
        Granularity::Decade,
        Granularity::Century,
        Granularity::Millennium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Microseconds => "microseconds",
            Granularity::Milliseconds => "milliseconds",
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
            Granularity::Decade => "decade",
            Granularity::Century => "century",
            Granularity::Millennium => "millennium",
        }
    }

    /// Start of the bucket containing `ts`.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let naive = ts.naive_utc();
        let date = naive.date();
        let truncated = match self {
            Granularity::Microseconds => {
                let ns = naive.nanosecond();
                naive.with_nanosecond(ns - ns % 1_000).unwrap_or(naive)
            }
            Granularity::Milliseconds => {
                let ns = naive.nanosecond();
                naive.with_nanosecond(ns - ns % 1_000_000).unwrap_or(naive)
            }
            Granularity::Second => naive.with_nanosecond(0).unwrap_or(naive),
            Granularity::Minute => at_time(date, naive.hour(), naive.minute()),
            Granularity::Hour => at_time(date, naive.hour(), 0),
            Granularity::Day => midnight(date),
            Granularity::Week => {
                let monday =
                    date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                midnight(monday)
            }
            Granularity::Month => first_of(date.year(), date.month(), date),
            Granularity::Quarter => first_of(date.year(), (date.month() - 1) / 3 * 3 + 1, date),
            Granularity::Year => first_of(date.year(), 1, date),
            Granularity::Decade => first_of(date.year() - date.year().rem_euclid(10), 1, date),
            Granularity::Century => {
                first_of((date.year() - 1).div_euclid(100) * 100 + 1, 1, date)
            }
            Granularity::Millennium => {
                first_of((date.year() - 1).div_euclid(1000) * 1000 + 1, 1, date)
            }
        };
        truncated.and_utc()
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn at_time(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| midnight(date))
}

/// First day of `year`-`month`. Falls back to `fallback` when the year is
/// outside chrono's representable range.
fn first_of(year: i32, month: u32, fallback: NaiveDate) -> NaiveDateTime {
    midnight(NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(fallback))
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "microsecond" => "microseconds",
            "millisecond" => "milliseconds",
            other => other,
        };
        Granularity::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == wanted)
            .ok_or_else(|| {
                Error::invalid(
                    "interval",
                    format!(
                        "unknown interval '{}'; expected one of {}",
                        s,
                        Granularity::ALL.map(|g| g.as_str()).join(", ")
                    ),
                )
            })
    }
}

/// Which aggregate to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateSpec {
    DailyAverage,
    Statistics(Granularity),
}

/// Output of [`aggregate`], ordered by bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateRows {
    Daily(Vec<DailyAverage>),
    Statistics(Vec<StatisticsRow>),
}

impl AggregateRows {
    pub fn len(&self) -> usize {
        match self {
            AggregateRows::Daily(rows) => rows.len(),
            AggregateRows::Statistics(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keeps only the requested page of groups.
    pub fn paginate(self, page: &Pagination) -> Self {
        match self {
            AggregateRows::Daily(rows) => {
                AggregateRows::Daily(page.apply(rows.into_iter()).collect())
            }
            AggregateRows::Statistics(rows) => {
                AggregateRows::Statistics(page.apply(rows.into_iter()).collect())
            }
        }
    }
}

/// Running totals for one bucket.
#[derive(Debug, Clone)]
struct Accumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    min_time: DateTime<Utc>,
    max_time: DateTime<Utc>,
}

impl Accumulator {
    fn new(p: &MeasurementPoint) -> Self {
        Self {
            count: 1,
            mean: p.value,
            m2: 0.0,
            min: p.value,
            max: p.value,
            min_time: p.timestamp,
            max_time: p.timestamp,
        }
    }

    fn push(&mut self, p: &MeasurementPoint) {
        self.count += 1;
        let delta = p.value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (p.value - self.mean);
        self.min = self.min.min(p.value);
        self.max = self.max.max(p.value);
        self.min_time = self.min_time.min(p.timestamp);
        self.max_time = self.max_time.max(p.timestamp);
    }

    fn sample_stddev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).sqrt())
    }
}

type Groups = BTreeMap<DateTime<Utc>, Accumulator>;

fn add(groups: &mut Groups, granularity: Granularity, p: &MeasurementPoint) {
    groups
        .entry(granularity.truncate(p.timestamp))
        .and_modify(|acc| acc.push(p))
        .or_insert_with(|| Accumulator::new(p));
}

fn daily_rows(groups: Groups) -> Vec<DailyAverage> {
    groups
        .into_iter()
        .map(|(start, acc)| DailyAverage {
            average: acc.mean,
            max_time: acc.max_time,
            min_time: acc.min_time,
            day: start.date_naive(),
        })
        .collect()
}

fn statistics_rows(groups: Groups) -> Vec<StatisticsRow> {
    groups
        .into_iter()
        .map(|(interval_start, acc)| StatisticsRow {
            count: acc.count,
            average: acc.mean,
            standard_deviation: acc.sample_stddev(),
            min: acc.min,
            max: acc.max,
            min_time: acc.min_time,
            max_time: acc.max_time,
            interval_start,
        })
        .collect()
}

/// Average value and time bounds per calendar day.
pub fn daily_averages<'a, I>(points: I) -> Vec<DailyAverage>
where
    I: IntoIterator<Item = &'a MeasurementPoint>,
{
    let mut groups = Groups::new();
    for p in points {
        add(&mut groups, Granularity::Day, p);
    }
    daily_rows(groups)
}

/// Count, mean, sample stddev, extrema, and time bounds per bucket.
pub fn statistics<'a, I>(points: I, granularity: Granularity) -> Vec<StatisticsRow>
where
    I: IntoIterator<Item = &'a MeasurementPoint>,
{
    let mut groups = Groups::new();
    for p in points {
        add(&mut groups, granularity, p);
    }
    statistics_rows(groups)
}

pub fn aggregate<'a, I>(points: I, spec: &AggregateSpec) -> AggregateRows
where
    I: IntoIterator<Item = &'a MeasurementPoint>,
{
    let mut aggregator = Aggregator::new(*spec);
    aggregator.extend(points);
    aggregator.finish()
}

/// Incremental [`aggregate`]: points are pushed one at a time and only the
/// per-bucket totals are kept, so a backend can fold a row stream without
/// buffering it.
#[derive(Debug, Clone)]
pub struct Aggregator {
    spec: AggregateSpec,
    groups: Groups,
}

impl Aggregator {
    pub fn new(spec: AggregateSpec) -> Self {
        Self {
            spec,
            groups: Groups::new(),
        }
    }

    pub fn push(&mut self, p: &MeasurementPoint) {
        let granularity = match self.spec {
            AggregateSpec::DailyAverage => Granularity::Day,
            AggregateSpec::Statistics(g) => g,
        };
        add(&mut self.groups, granularity, p);
    }

    pub fn finish(self) -> AggregateRows {
        match self.spec {
            AggregateSpec::DailyAverage => AggregateRows::Daily(daily_rows(self.groups)),
            AggregateSpec::Statistics(_) => {
                AggregateRows::Statistics(statistics_rows(self.groups))
            }
        }
    }
}

impl<'a> Extend<&'a MeasurementPoint> for Aggregator {
    fn extend<I: IntoIterator<Item = &'a MeasurementPoint>>(&mut self, points: I) {
        for p in points {
            self.push(p);
        }
    }
}
