//! Main securities and the correlated entities ranked against them.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::series::PreparedSeries;
use super::window::Window;

/// Candidate symbol → Pearson correlation, for one main security and one window.
pub type CorrelationMap = BTreeMap<String, f64>;

/// A candidate that earned a rank, with the correlation that put it there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedEntity {
    pub symbol: String,
    pub correlation: f64,
}

impl CorrelatedEntity {
    pub fn new(symbol: impl Into<String>, correlation: f64) -> Self {
        Self {
            symbol: symbol.into(),
            correlation,
        }
    }
}

/// What kind of series a main security is.
///
/// Market securities are keyed by ticker. FRED series live in their own id
/// namespace, so a ticker never names the same entity as a FRED series even
/// when the strings happen to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MainKind {
    Security {
        symbol: String,
    },
    FredMd {
        fred_md_id: String,
        api_id: Option<String>,
        title: String,
        tcode: Option<u8>,
        frequency: Option<String>,
    },
    FredApi {
        series_id: String,
        title: String,
    },
}

impl MainKind {
    pub fn identity(&self) -> &str {
        match self {
            MainKind::Security { symbol } => symbol,
            MainKind::FredMd { fred_md_id, .. } => fred_md_id,
            MainKind::FredApi { series_id, .. } => series_id,
        }
    }

    /// True when `symbol` names this very entity, so the pair is a self-comparison.
    pub fn is_same_entity(&self, symbol: &str) -> bool {
        match self {
            MainKind::Security { symbol: own } => own == symbol,
            MainKind::FredMd { .. } | MainKind::FredApi { .. } => false,
        }
    }
}

/// A reference series for which correlated peers are sought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainSecurity {
    pub kind: MainKind,
    #[serde(default)]
    pub series_data_detrended: BTreeMap<Window, PreparedSeries>,
    #[serde(default)]
    pub all_correlations: BTreeMap<Window, CorrelationMap>,
    #[serde(default)]
    pub positive_correlations: BTreeMap<Window, Vec<CorrelatedEntity>>,
    #[serde(default)]
    pub negative_correlations: BTreeMap<Window, Vec<CorrelatedEntity>>,
}

impl MainSecurity {
    pub fn new(kind: MainKind) -> Self {
        Self {
            kind,
            series_data_detrended: BTreeMap::new(),
            all_correlations: BTreeMap::new(),
            positive_correlations: BTreeMap::new(),
            negative_correlations: BTreeMap::new(),
        }
    }

    pub fn security(symbol: impl Into<String>) -> Self {
        Self::new(MainKind::Security {
            symbol: symbol.into(),
        })
    }

    pub fn fred_md(
        fred_md_id: impl Into<String>,
        api_id: Option<String>,
        title: impl Into<String>,
        tcode: Option<u8>,
        frequency: Option<String>,
    ) -> Self {
        Self::new(MainKind::FredMd {
            fred_md_id: fred_md_id.into(),
            api_id,
            title: title.into(),
            tcode,
            frequency,
        })
    }

    pub fn fred_api(series_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(MainKind::FredApi {
            series_id: series_id.into(),
            title: title.into(),
        })
    }

    pub fn identity(&self) -> &str {
        self.kind.identity()
    }

    pub fn is_same_entity(&self, symbol: &str) -> bool {
        self.kind.is_same_entity(symbol)
    }

    pub fn prepared_for(&self, window: Window) -> Option<&PreparedSeries> {
        self.series_data_detrended.get(&window)
    }

    pub fn correlation_map_for(&self, window: Window) -> Option<&CorrelationMap> {
        self.all_correlations.get(&window)
    }

    /// `(positive, negative)` ranked lists; empty slices before ranking.
    pub fn ranked_for(&self, window: Window) -> (&[CorrelatedEntity], &[CorrelatedEntity]) {
        (
            self.positive_correlations
                .get(&window)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            self.negative_correlations
                .get(&window)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        )
    }

    pub fn set_prepared(&mut self, window: Window, series: PreparedSeries) {
        self.series_data_detrended.insert(window, series);
    }

    pub fn record_correlation(&mut self, window: Window, symbol: impl Into<String>, value: f64) {
        self.all_correlations
            .entry(window)
            .or_default()
            .insert(symbol.into(), value);
    }

    /// Slice a full-history prepared series into one series per window,
    /// covering `[window start, end_date]`. The window start is clamped to
    /// the first observation, so a short history still yields its overlap.
    pub fn load_windows(&mut self, prepared: &PreparedSeries, windows: &[Window], end_date: NaiveDate) {
        let end = end_date.and_time(NaiveTime::MIN) + chrono::Duration::days(1)
            - chrono::Duration::nanoseconds(1);
        for window in windows {
            let mut start = window.start_datetime();
            if let Some(first) = prepared.series().first_timestamp() {
                start = start.max(first);
            }
            self.set_prepared(*window, prepared.slice_between(start, end));
        }
    }

    /// Check the ranked-list invariants: at most `k` entries per list, positive
    /// list descending, negative list ascending, and no unranked map left behind
    /// for a ranked window.
    pub fn check_invariants(&self, k: usize) -> Result<(), String> {
        for (window, list) in &self.positive_correlations {
            if list.len() > k {
                return Err(format!("{window}: {} positive entries exceeds {k}", list.len()));
            }
            if list.windows(2).any(|p| p[0].correlation < p[1].correlation) {
                return Err(format!("{window}: positive list is not descending"));
            }
            if self.all_correlations.get(window).is_some_and(|m| !m.is_empty()) {
                return Err(format!("{window}: ranked window still holds a raw map"));
            }
        }
        for (window, list) in &self.negative_correlations {
            if list.len() > k {
                return Err(format!("{window}: {} negative entries exceeds {k}", list.len()));
            }
            if list.windows(2).any(|p| p[0].correlation > p[1].correlation) {
                return Err(format!("{window}: negative list is not ascending"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::TimeSeries;

    fn prepared(days: &[(u32, f64)]) -> PreparedSeries {
        let base = NaiveDate::from_ymd_opt(2022, 12, 1).unwrap();
        let points = days
            .iter()
            .map(|(d, v)| (base + chrono::Duration::days(*d as i64), *v));
        PreparedSeries::from_detrended(TimeSeries::from_daily(points).unwrap())
    }

    #[test]
    fn security_excludes_its_own_ticker() {
        let m = MainSecurity::security("SPY");
        assert!(m.is_same_entity("SPY"));
        assert!(!m.is_same_entity("QQQ"));
        assert_eq!(m.identity(), "SPY");
    }

    #[test]
    fn fred_series_never_matches_a_ticker() {
        let m = MainSecurity::fred_api("GDP", "Gross Domestic Product");
        assert!(!m.is_same_entity("GDP"));
        assert_eq!(m.identity(), "GDP");
    }

    #[test]
    fn record_correlation_creates_window_map() {
        let mut m = MainSecurity::security("SPY");
        let w = Window::starting(2023);
        m.record_correlation(w, "QQQ", 0.8);
        assert_eq!(m.correlation_map_for(w).unwrap()["QQQ"], 0.8);
    }

    #[test]
    fn load_windows_slices_from_window_start() {
        // Dec 2 2022 .. Jan 10 2023
        let points: Vec<(u32, f64)> = (1..=40).map(|d| (d, d as f64)).collect();
        let mut m = MainSecurity::security("SPY");
        let w23 = Window::starting(2023);
        let w21 = Window::starting(2021);
        m.load_windows(
            &prepared(&points),
            &[w23, w21],
            NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
        );

        let s23 = m.prepared_for(w23).unwrap();
        assert_eq!(s23.len(), 5);
        assert_eq!(
            s23.timestamps()[0].date(),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
        );

        // History starts after 2021, so the whole series up to the end date is kept.
        assert_eq!(m.prepared_for(w21).unwrap().len(), 35);
    }

    #[test]
    fn ranked_for_is_empty_before_ranking() {
        let m = MainSecurity::security("SPY");
        let (pos, neg) = m.ranked_for(Window::starting(2023));
        assert!(pos.is_empty());
        assert!(neg.is_empty());
    }

    #[test]
    fn invariant_check_flags_unsorted_lists() {
        let mut m = MainSecurity::security("SPY");
        let w = Window::starting(2023);
        m.positive_correlations.insert(
            w,
            vec![CorrelatedEntity::new("A", 0.1), CorrelatedEntity::new("B", 0.9)],
        );
        assert!(m.check_invariants(100).is_err());
        assert!(MainSecurity::security("QQQ").check_invariants(100).is_ok());
    }
}
