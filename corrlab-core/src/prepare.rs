//! Validation and preparation of raw series.
//!
//! `Preparer::prepare` runs, in order:
//! 1. fetch from the store (any failure → `NoData`)
//! 2. structural checks (→ `Structural`, symbol appended to the exclude list)
//! 3. continuity: no run of `WINDOW_SIZE` missing values
//! 4. non-repetition: no run of `WINDOW_SIZE` identical values
//! 5. detrend by first difference
//!
//! Rejections are ordinary return values; nothing here panics on bad data.

use chrono::NaiveDateTime;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::{ExcludeListSink, RawFrame, SeriesStore, SourceKind};
use crate::domain::{PreparedSeries, SeriesError, TimeSeries};

/// Run length that triggers the continuity and repetition rejections.
pub const WINDOW_SIZE: usize = 10;

/// Why a symbol produced no prepared series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("no data: {0}")]
    NoData(String),

    #[error("structurally unusable: {0}")]
    Structural(String),

    #[error("gap of consecutive missing values starting at {start}")]
    Continuity { start: NaiveDateTime },

    #[error("run of values stuck at {value} starting at {start}")]
    Repetition { start: NaiveDateTime, value: f64 },
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::NoData(_) => "no_data",
            Rejection::Structural(_) => "structural",
            Rejection::Continuity { .. } => "continuity",
            Rejection::Repetition { .. } => "repetition",
        }
    }
}

/// Turns store frames into prepared series.
pub struct Preparer<'a> {
    store: &'a dyn SeriesStore,
    exclude: &'a dyn ExcludeListSink,
}

impl<'a> Preparer<'a> {
    pub fn new(store: &'a dyn SeriesStore, exclude: &'a dyn ExcludeListSink) -> Self {
        Self { store, exclude }
    }

    pub fn prepare(&self, symbol: &str, source: SourceKind) -> Result<PreparedSeries, Rejection> {
        let result = self.validate(symbol, source);
        match &result {
            Ok(prepared) => debug!(symbol, points = prepared.len(), "prepared"),
            Err(r @ Rejection::NoData(_)) => debug!(symbol, reason = %r, "skipped"),
            Err(r @ Rejection::Structural(_)) => {
                warn!(symbol, reason = %r, "rejected, adding to exclude list");
                self.exclude.append(symbol);
            }
            Err(r) => warn!(symbol, kind = r.kind(), reason = %r, "rejected"),
        }
        result
    }

    fn validate(&self, symbol: &str, source: SourceKind) -> Result<PreparedSeries, Rejection> {
        let frame = self
            .store
            .fetch(symbol, source)
            .map_err(|e| Rejection::NoData(e.to_string()))?;
        if frame.value().is_none() {
            return Err(Rejection::NoData(format!(
                "no '{}' column",
                frame.value_column
            )));
        }
        let series = check_structure(&frame)?;
        check_continuity(&series)?;
        check_non_repeating(&series)?;
        Ok(detrend(&series))
    }
}

/// Structural checks on a raw frame; returns the value column as a sorted series.
///
/// Rejects an empty frame, repeated column names, a column whose length
/// differs from the index, any column with fewer than two distinct
/// non-missing values, and repeated timestamps.
pub fn check_structure(frame: &RawFrame) -> Result<TimeSeries, Rejection> {
    if frame.is_empty() {
        return Err(Rejection::Structural("empty frame".into()));
    }

    let mut names = HashSet::new();
    for column in &frame.columns {
        if !names.insert(column.name.as_str()) {
            return Err(Rejection::Structural(format!(
                "duplicated column '{}'",
                column.name
            )));
        }
        if column.values.len() != frame.height() {
            return Err(Rejection::Structural(format!(
                "column '{}' has {} rows, index has {}",
                column.name,
                column.values.len(),
                frame.height()
            )));
        }
        let distinct = distinct_non_missing(&column.values);
        if distinct == 0 {
            return Err(Rejection::Structural(format!(
                "column '{}' is entirely missing",
                column.name
            )));
        }
        if distinct < 2 {
            return Err(Rejection::Structural(format!(
                "column '{}' has a single distinct value",
                column.name
            )));
        }
    }

    let values = frame
        .value()
        .map(|c| c.values.clone())
        .ok_or_else(|| Rejection::NoData(format!("no '{}' column", frame.value_column)))?;
    let points = frame.timestamps.iter().copied().zip(values).collect();
    TimeSeries::from_points(points).map_err(|e| match e {
        SeriesError::DuplicateTimestamp(ts) => {
            Rejection::Structural(format!("duplicated timestamp {ts}"))
        }
        other => Rejection::Structural(other.to_string()),
    })
}

/// Distinct non-missing values, capped at 2.
fn distinct_non_missing(values: &[f64]) -> usize {
    let mut present = values.iter().filter(|v| !v.is_nan());
    match present.next() {
        None => 0,
        Some(first) if present.any(|v| v != first) => 2,
        Some(_) => 1,
    }
}

/// Reject a run of `WINDOW_SIZE` or more consecutive missing values.
pub fn check_continuity(series: &TimeSeries) -> Result<(), Rejection> {
    let mut run = 0usize;
    for (i, v) in series.values().iter().enumerate() {
        if v.is_nan() {
            run += 1;
            if run >= WINDOW_SIZE {
                return Err(Rejection::Continuity {
                    start: series.timestamps()[i + 1 - run],
                });
            }
        } else {
            run = 0;
        }
    }
    Ok(())
}

/// Reject a run of `WINDOW_SIZE` or more consecutive identical values.
/// Missing values never count as repeating.
pub fn check_non_repeating(series: &TimeSeries) -> Result<(), Rejection> {
    let values = series.values();
    let mut run = 1usize;
    for i in 1..values.len() {
        if !values[i].is_nan() && values[i] == values[i - 1] {
            run += 1;
            if run >= WINDOW_SIZE {
                return Err(Rejection::Repetition {
                    start: series.timestamps()[i + 1 - run],
                    value: values[i],
                });
            }
        } else {
            run = 1;
        }
    }
    Ok(())
}

/// First difference, dropping the leading point and any undefined difference.
pub fn detrend(series: &TimeSeries) -> PreparedSeries {
    PreparedSeries::detrend(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryExcludeList, MemoryStore, RawColumn};
    use chrono::NaiveDate;

    fn ts(n: usize) -> Vec<NaiveDateTime> {
        let base = NaiveDate::from_ymd_opt(2022, 1, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect()
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64).sin() + i as f64).collect()
    }

    fn series(values: Vec<f64>) -> TimeSeries {
        TimeSeries::new(ts(values.len()), values).unwrap()
    }

    #[test]
    fn nine_missing_pass_ten_reject() {
        let mut v = ramp(30);
        for x in &mut v[5..14] {
            *x = f64::NAN;
        }
        assert!(check_continuity(&series(v.clone())).is_ok());
        v[14] = f64::NAN;
        assert!(matches!(
            check_continuity(&series(v)),
            Err(Rejection::Continuity { .. })
        ));
    }

    #[test]
    fn nine_repeats_pass_ten_reject() {
        let mut v = ramp(30);
        for x in &mut v[3..12] {
            *x = 42.0;
        }
        assert!(check_non_repeating(&series(v.clone())).is_ok());
        v[12] = 42.0;
        let err = check_non_repeating(&series(v)).unwrap_err();
        assert_eq!(
            err,
            Rejection::Repetition {
                start: ts(30)[3],
                value: 42.0
            }
        );
    }

    #[test]
    fn missing_runs_are_not_repetition() {
        let mut v = ramp(20);
        for x in &mut v[2..14] {
            *x = f64::NAN;
        }
        assert!(check_non_repeating(&series(v)).is_ok());
    }

    #[test]
    fn constant_series_detrends_to_zeros() {
        let s = series(vec![5.0; 8]);
        let d = detrend(&s);
        assert_eq!(d.len(), 7);
        assert!(d.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn structure_rejects_single_valued_column() {
        let frame = RawFrame::new(
            ts(5),
            vec![
                RawColumn::new("close", ramp(5)),
                RawColumn::new("volume", vec![0.0; 5]),
            ],
            "close",
        );
        assert!(matches!(
            check_structure(&frame),
            Err(Rejection::Structural(_))
        ));
    }

    #[test]
    fn structure_rejects_duplicate_timestamps_and_columns() {
        let mut stamps = ts(4);
        stamps[3] = stamps[2];
        let frame = RawFrame::single(stamps, "close", ramp(4));
        assert!(matches!(check_structure(&frame), Err(Rejection::Structural(_))));

        let frame = RawFrame::new(
            ts(4),
            vec![RawColumn::new("close", ramp(4)), RawColumn::new("close", ramp(4))],
            "close",
        );
        assert!(matches!(check_structure(&frame), Err(Rejection::Structural(_))));
    }

    #[test]
    fn structure_sorts_unordered_rows() {
        let mut stamps = ts(3);
        stamps.reverse();
        let frame = RawFrame::single(stamps, "close", vec![3.0, 2.0, 1.0]);
        let s = check_structure(&frame).unwrap();
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(s.timestamps(), ts(3).as_slice());
    }

    #[test]
    fn structural_rejection_feeds_exclude_list() {
        let store = MemoryStore::new();
        store.insert(
            "FLAT",
            SourceKind::FileDaily,
            RawFrame::single(ts(20), "close", vec![1.0; 20]),
        );
        let exclude = MemoryExcludeList::new();
        let preparer = Preparer::new(&store, &exclude);

        assert!(matches!(
            preparer.prepare("FLAT", SourceKind::FileDaily),
            Err(Rejection::Structural(_))
        ));
        assert!(matches!(
            preparer.prepare("GONE", SourceKind::FileDaily),
            Err(Rejection::NoData(_))
        ));
        assert_eq!(exclude.symbols(), vec!["FLAT"]);
    }

    #[test]
    fn missing_value_column_is_no_data() {
        let store = MemoryStore::new();
        store.insert(
            "ODD",
            SourceKind::FileDaily,
            RawFrame::new(ts(5), vec![RawColumn::new("open", ramp(5))], "close"),
        );
        let exclude = MemoryExcludeList::new();
        let preparer = Preparer::new(&store, &exclude);
        assert!(matches!(
            preparer.prepare("ODD", SourceKind::FileDaily),
            Err(Rejection::NoData(_))
        ));
        assert!(exclude.symbols().is_empty());
    }

    #[test]
    fn clean_series_is_prepared() {
        let store = MemoryStore::new();
        store.insert_series("OK", SourceKind::FileDaily, &series(ramp(25)));
        let exclude = MemoryExcludeList::new();
        let prepared = Preparer::new(&store, &exclude)
            .prepare("OK", SourceKind::FileDaily)
            .unwrap();
        assert_eq!(prepared.len(), 24);
    }
}
