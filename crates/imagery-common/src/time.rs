//! Acquisition date handling.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ImageryError, ImageryResult};

/// User-supplied time interval, expanded into acquisition dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInterval {
    /// Number of days back from today (sign ignored), today included.
    DaysBack(i64),
    /// One specific date.
    Single(NaiveDate),
    /// Explicit dates. Exactly two dates are read as an inclusive range.
    List(Vec<NaiveDate>),
}

impl TimeInterval {
    /// Build an interval from date strings as given on the command line.
    pub fn from_date_strings<S: AsRef<str>>(dates: &[S]) -> ImageryResult<Self> {
        let parsed = dates
            .iter()
            .map(|d| parse_date(d.as_ref()))
            .collect::<ImageryResult<Vec<_>>>()?;

        match parsed.as_slice() {
            [] => Err(ImageryError::InvalidTime("no date given".to_string())),
            [single] => Ok(TimeInterval::Single(*single)),
            _ => Ok(TimeInterval::List(parsed)),
        }
    }

    /// Expand into an ordered, deduplicated sequence of acquisition dates.
    ///
    /// `today` is passed in so that day-count intervals are reproducible.
    pub fn acquisition_dates(&self, today: NaiveDate) -> ImageryResult<Vec<NaiveDate>> {
        match self {
            TimeInterval::DaysBack(days) => {
                let start = today - Duration::days(days.abs());
                Ok(date_range(start, today))
            }
            TimeInterval::Single(date) => Ok(vec![*date]),
            TimeInterval::List(dates) if dates.len() == 2 => {
                let (start, end) = (dates[0], dates[1]);
                if start > end {
                    return Err(ImageryError::InvalidTime(format!(
                        "range start {} is after end {}",
                        start, end
                    )));
                }
                Ok(date_range(start, end))
            }
            TimeInterval::List(dates) if dates.is_empty() => {
                Err(ImageryError::InvalidTime("empty date list".to_string()))
            }
            TimeInterval::List(dates) => {
                let mut dates = dates.clone();
                dates.sort();
                dates.dedup();
                Ok(dates)
            }
        }
    }
}

/// Inclusive daily range.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Parse a calendar date from `YYYY-MM-DD` or a full ISO 8601 timestamp.
pub fn parse_date(s: &str) -> ImageryResult<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ndt.date());
    }
    Err(ImageryError::InvalidTime(s.to_string()))
}

/// First and last second of an acquisition day, in UTC.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    let end = start + Duration::days(1) - Duration::seconds(1);
    (start, end)
}

/// Join timestamps closer than `tolerance` into a single acquisition.
///
/// Tiles of one orbit pass are stamped a few seconds apart; the earliest
/// timestamp of each cluster is kept.
pub fn join_timestamps(mut timestamps: Vec<DateTime<Utc>>, tolerance: Duration) -> Vec<DateTime<Utc>> {
    timestamps.sort();
    let mut joined: Vec<DateTime<Utc>> = Vec::with_capacity(timestamps.len());
    for ts in timestamps {
        match joined.last() {
            Some(last) if ts - *last <= tolerance => {}
            _ => joined.push(ts),
        }
    }
    joined
}

/// Distinct calendar dates of a set of timestamps, in order.
pub fn distinct_dates(timestamps: &[DateTime<Utc>]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = timestamps.iter().map(|ts| ts.date_naive()).collect();
    dates.sort();
    dates.dedup();
    dates
}
