//! Core types for the bucket store
//!
//! This module defines the fundamental types used throughout the store layer:
//! - `Resolution`: the bucket granularity (hour or day)
//! - `BucketKey`: the full identity of a stored bucket
//! - `BucketRow`: one bucket as read back from the store

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bucket granularity for a chart series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// One bucket per UTC hour
    Hour,
    /// One bucket per UTC day
    Day,
}

impl Resolution {
    /// All resolutions a chart maintains, for iteration.
    pub fn all() -> &'static [Resolution] {
        &[Resolution::Hour, Resolution::Day]
    }

    /// The span of one bucket at this resolution.
    pub fn duration(&self) -> Duration {
        match self {
            Resolution::Hour => Duration::hours(1),
            Resolution::Day => Duration::days(1),
        }
    }

    /// Truncate a timestamp down to this resolution's boundary (UTC).
    ///
    /// Pure and infallible: floors the unix timestamp to the period length,
    /// so an instant exactly on a boundary maps to itself.
    pub fn truncate(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.duration().num_seconds();
        let rem = t.timestamp().rem_euclid(step);
        let whole = t - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()));
        whole - Duration::seconds(rem)
    }

    /// Start of the period `n` periods before `from` (`from` must already be
    /// truncated).
    pub fn periods_back(&self, from: DateTime<Utc>, n: usize) -> DateTime<Utc> {
        from - self.duration() * (n as i32)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hour => "hour",
            Resolution::Day => "day",
        }
    }

    /// Parse the stored representation; `None` for unknown strings.
    pub fn parse(s: &str) -> Option<Resolution> {
        match s {
            "hour" => Some(Resolution::Hour),
            "day" => Some(Resolution::Day),
            _ => None,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full identity of a stored bucket.
///
/// For a given `(chart, resolution, group)` series, buckets are keyed by
/// their period start; no two rows ever share the full tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Stable chart name
    pub chart: &'static str,
    /// Bucket granularity
    pub resolution: Resolution,
    /// Optional grouping dimension (e.g. a user id); `None` for ungrouped charts
    pub group: Option<String>,
    /// Period start, truncated to the resolution boundary
    pub bucket_start: DateTime<Utc>,
}

impl BucketKey {
    pub fn new(
        chart: &'static str,
        resolution: Resolution,
        group: Option<&str>,
        bucket_start: DateTime<Utc>,
    ) -> Self {
        Self {
            chart,
            resolution,
            group: group.map(Into::into),
            bucket_start,
        }
    }
}

/// One bucket as returned by range reads. The chart/resolution/group are
/// implied by the query; only the period start and payload vary per row.
#[derive(Debug, Clone)]
pub struct BucketRow {
    pub bucket_start: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_hour() {
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let truncated = Resolution::Hour.truncate(t);

        assert_eq!(
            truncated,
            Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_truncate_day() {
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let truncated = Resolution::Day.truncate(t);

        assert_eq!(truncated, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_truncate_on_boundary_is_identity() {
        let boundary = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();
        assert_eq!(Resolution::Hour.truncate(boundary), boundary);

        let midnight = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();
        assert_eq!(Resolution::Day.truncate(midnight), midnight);
    }

    #[test]
    fn test_truncate_drops_subsecond() {
        let t = Utc
            .with_ymd_and_hms(2026, 3, 14, 15, 0, 0)
            .unwrap()
            .checked_add_signed(Duration::milliseconds(250))
            .unwrap();

        assert_eq!(
            Resolution::Hour.truncate(t),
            Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_periods_back() {
        let from = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();

        assert_eq!(Resolution::Hour.periods_back(from, 0), from);
        assert_eq!(
            Resolution::Hour.periods_back(from, 3),
            Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Resolution::Day.periods_back(Resolution::Day.truncate(from), 2),
            Utc.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resolution_parse_roundtrip() {
        for &resolution in Resolution::all() {
            assert_eq!(Resolution::parse(resolution.as_str()), Some(resolution));
        }
        assert_eq!(Resolution::parse("week"), None);
    }

    #[test]
    fn test_bucket_key_identity() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();

        let a = BucketKey::new("notes", Resolution::Hour, Some("user1"), start);
        let b = BucketKey::new("notes", Resolution::Hour, Some("user1"), start);
        let c = BucketKey::new("notes", Resolution::Hour, Some("user2"), start);
        let d = BucketKey::new("notes", Resolution::Day, Some("user1"), start);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
