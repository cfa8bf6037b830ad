//! Raw multi-column frames as returned by a store, before validation.

use chrono::NaiveDateTime;

use super::provider::RawBar;
use crate::domain::TimeSeries;

/// One named column. Missing observations are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<f64>,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A time-indexed frame with one or more numeric columns.
///
/// `value_column` names the column the engine correlates on (adjusted close
/// for daily bars, close for intraday bars). Row order follows the source and
/// is not guaranteed sorted; the preparer sorts and rejects duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<RawColumn>,
    pub value_column: String,
}

impl RawFrame {
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<RawColumn>,
        value_column: impl Into<String>,
    ) -> Self {
        Self {
            timestamps,
            columns,
            value_column: value_column.into(),
        }
    }

    /// A single-column frame.
    pub fn single(
        timestamps: Vec<NaiveDateTime>,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Self {
        let name = name.into();
        Self {
            timestamps,
            columns: vec![RawColumn::new(name.clone(), values)],
            value_column: name,
        }
    }

    pub fn from_series(name: impl Into<String>, series: &TimeSeries) -> Self {
        Self::single(series.timestamps().to_vec(), name, series.values().to_vec())
    }

    /// Daily bars as a frame keyed on `Adj Close`.
    pub fn from_bars(bars: &[RawBar]) -> Self {
        let col = |name: &str, f: fn(&RawBar) -> f64| {
            RawColumn::new(name, bars.iter().map(f).collect())
        };
        Self {
            timestamps: bars
                .iter()
                .map(|b| b.date.and_time(chrono::NaiveTime::MIN))
                .collect(),
            columns: vec![
                col("Open", |b| b.open),
                col("High", |b| b.high),
                col("Low", |b| b.low),
                col("Close", |b| b.close),
                col("Adj Close", |b| b.adj_close),
                col("Volume", |b| b.volume as f64),
            ],
            value_column: "Adj Close".to_string(),
        }
    }

    pub fn height(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn value(&self) -> Option<&RawColumn> {
        self.column(&self.value_column)
    }
}
