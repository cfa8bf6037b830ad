//! Time-indexed numeric series.
//!
//! `TimeSeries` is the raw form handed out by a store: strictly increasing
//! timestamps, missing observations encoded as `NaN`. `PreparedSeries` is a
//! series that passed validation and was first-differenced; it never holds
//! `NaN`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a series cannot be constructed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("timestamps and values differ in length ({timestamps} vs {values})")]
    LengthMismatch { timestamps: usize, values: usize },

    #[error("duplicate timestamp {0}")]
    DuplicateTimestamp(NaiveDateTime),

    #[error("timestamp {0} is not after its predecessor")]
    OutOfOrder(NaiveDateTime),
}

/// Ordered `(timestamp, value)` observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    timestamps: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Build from parallel vectors. Timestamps must already be strictly increasing.
    pub fn new(timestamps: Vec<NaiveDateTime>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if timestamps.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        for pair in timestamps.windows(2) {
            if pair[1] == pair[0] {
                return Err(SeriesError::DuplicateTimestamp(pair[1]));
            }
            if pair[1] < pair[0] {
                return Err(SeriesError::OutOfOrder(pair[1]));
            }
        }
        Ok(Self { timestamps, values })
    }

    /// Build from unordered points. Points are sorted by timestamp; a repeated
    /// timestamp is still an error.
    pub fn from_points(mut points: Vec<(NaiveDateTime, f64)>) -> Result<Self, SeriesError> {
        points.sort_by_key(|(ts, _)| *ts);
        let (timestamps, values) = points.into_iter().unzip();
        Self::new(timestamps, values)
    }

    /// Build a daily series; each date maps to midnight.
    pub fn from_daily(
        points: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Result<Self, SeriesError> {
        Self::from_points(
            points
                .into_iter()
                .map(|(date, v)| (date.and_time(chrono::NaiveTime::MIN), v))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    /// Points with `start <= ts <= end`. Both bounds inclusive.
    pub fn slice_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let lo = self.timestamps.partition_point(|ts| *ts < start);
        let hi = self.timestamps.partition_point(|ts| *ts <= end);
        if lo >= hi {
            return Self::default();
        }
        Self {
            timestamps: self.timestamps[lo..hi].to_vec(),
            values: self.values[lo..hi].to_vec(),
        }
    }

    /// First difference. The leading point has no predecessor and is dropped,
    /// as is every difference that touches a missing value.
    pub fn diff(&self) -> Self {
        let mut timestamps = Vec::with_capacity(self.len().saturating_sub(1));
        let mut values = Vec::with_capacity(self.len().saturating_sub(1));
        for i in 1..self.len() {
            let d = self.values[i] - self.values[i - 1];
            if d.is_nan() {
                continue;
            }
            timestamps.push(self.timestamps[i]);
            values.push(d);
        }
        Self { timestamps, values }
    }
}

/// A validated, detrended series ready for correlation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreparedSeries(TimeSeries);

impl PreparedSeries {
    /// First-difference a raw series.
    pub fn detrend(raw: &TimeSeries) -> Self {
        Self(raw.diff())
    }

    /// Wrap a series that is already differenced (persisted objects, fixtures).
    /// Missing values are dropped.
    pub fn from_detrended(series: TimeSeries) -> Self {
        if series.values.iter().all(|v| !v.is_nan()) {
            return Self(series);
        }
        let (timestamps, values) = series
            .iter()
            .filter(|(_, v)| !v.is_nan())
            .unzip();
        Self(TimeSeries { timestamps, values })
    }

    pub fn series(&self) -> &TimeSeries {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        self.0.timestamps()
    }

    pub fn values(&self) -> &[f64] {
        self.0.values()
    }

    /// Restrict to `[start, end]`. Still a valid prepared series.
    pub fn slice_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self(self.0.slice_between(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn daily(values: &[f64]) -> TimeSeries {
        TimeSeries::from_daily(values.iter().enumerate().map(|(i, v)| (day(i as u32 + 1), *v)))
            .unwrap()
    }

    #[test]
    fn from_points_sorts_input() {
        let s = TimeSeries::from_daily(vec![(day(3), 3.0), (day(1), 1.0), (day(2), 2.0)]).unwrap();
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let err = TimeSeries::from_daily(vec![(day(1), 1.0), (day(1), 2.0)]).unwrap_err();
        assert!(matches!(err, SeriesError::DuplicateTimestamp(_)));
    }

    #[test]
    fn new_rejects_descending_timestamps() {
        let ts = vec![
            day(2).and_hms_opt(0, 0, 0).unwrap(),
            day(1).and_hms_opt(0, 0, 0).unwrap(),
        ];
        let err = TimeSeries::new(ts, vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder(_)));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let ts = vec![day(1).and_hms_opt(0, 0, 0).unwrap()];
        assert!(matches!(
            TimeSeries::new(ts, vec![]),
            Err(SeriesError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn diff_drops_leading_point() {
        let d = daily(&[1.0, 3.0, 6.0, 10.0]).diff();
        assert_eq!(d.values(), &[2.0, 3.0, 4.0]);
        assert_eq!(d.timestamps()[0], day(2).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn diff_of_constant_is_zero() {
        let d = daily(&[5.0; 12]).diff();
        assert_eq!(d.len(), 11);
        assert!(d.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn diff_skips_missing_neighbours() {
        let d = daily(&[1.0, f64::NAN, 3.0, 4.0]).diff();
        assert_eq!(d.values(), &[1.0]);
    }

    #[test]
    fn slice_is_inclusive() {
        let s = daily(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let sliced = s.slice_between(
            day(2).and_hms_opt(0, 0, 0).unwrap(),
            day(4).and_hms_opt(0, 0, 0).unwrap(),
        );
        assert_eq!(sliced.values(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn slice_outside_range_is_empty() {
        let s = daily(&[1.0, 2.0]);
        let sliced = s.slice_between(
            day(10).and_hms_opt(0, 0, 0).unwrap(),
            day(20).and_hms_opt(0, 0, 0).unwrap(),
        );
        assert!(sliced.is_empty());
    }

    #[test]
    fn prepared_from_detrended_drops_nan() {
        let p = PreparedSeries::from_detrended(daily(&[1.0, f64::NAN, -1.0]));
        assert_eq!(p.values(), &[1.0, -1.0]);
    }
}
