//! The series store boundary: where raw frames come from.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use thiserror::Error;

use super::frame::RawFrame;
use super::provider::DataError;
use crate::domain::TimeSeries;

/// Where a raw series is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Daily bars on disk.
    FileDaily,
    /// Intraday bars on disk.
    FileIntraday,
    /// Download daily bars now (and keep a copy on disk).
    LiveDownload,
    /// Columnar warehouse query.
    Warehouse,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::FileDaily,
        SourceKind::FileIntraday,
        SourceKind::LiveDownload,
        SourceKind::Warehouse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::FileDaily => "file_daily",
            SourceKind::FileIntraday => "file_intraday",
            SourceKind::LiveDownload => "live_download",
            SourceKind::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source identifier that names no known source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source: '{0}'")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSource;

    /// Accepts the canonical names plus the provider aliases used in older
    /// run files (`yahoo` for daily files, `alpaca` for intraday files).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file_daily" | "daily" | "yahoo" => Ok(SourceKind::FileDaily),
            "file_intraday" | "intraday" | "alpaca" => Ok(SourceKind::FileIntraday),
            "live_download" | "download" => Ok(SourceKind::LiveDownload),
            "warehouse" | "clickhouse" => Ok(SourceKind::Warehouse),
            _ => Err(UnknownSource(s.to_string())),
        }
    }
}

/// Supplies raw frames for symbols.
///
/// Ordinary "not found" conditions come back as `Err(DataError)`; stores
/// must not panic on them.
pub trait SeriesStore: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this store can serve `source` at all. Asking for a source the
    /// store cannot serve is a configuration error, not a data error.
    fn supports(&self, source: SourceKind) -> bool;

    fn fetch(&self, symbol: &str, source: SourceKind) -> Result<RawFrame, DataError>;
}

/// In-memory store, used by tests and by callers that already hold frames.
#[derive(Debug, Default)]
pub struct MemoryStore {
    frames: RwLock<HashMap<(SourceKind, String), RawFrame>>,
    sources: Option<HashSet<SourceKind>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    /// A store that answers for every source.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only serves the listed sources.
    pub fn only(sources: &[SourceKind]) -> Self {
        Self {
            sources: Some(sources.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn insert(&self, symbol: &str, source: SourceKind, frame: RawFrame) {
        self.frames
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((source, symbol.to_string()), frame);
    }

    /// Insert a single-column series under `close`.
    pub fn insert_series(&self, symbol: &str, source: SourceKind, series: &TimeSeries) {
        self.insert(symbol, source, RawFrame::from_series("close", series));
    }

    /// Number of `fetch` calls served so far, found or not.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl SeriesStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, source: SourceKind) -> bool {
        self.sources.as_ref().map_or(true, |s| s.contains(&source))
    }

    fn fetch(&self, symbol: &str, source: SourceKind) -> Result<RawFrame, DataError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if !self.supports(source) {
            return Err(DataError::UnsupportedSource(source.to_string()));
        }
        self.frames
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(source, symbol.to_string()))
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn source_aliases_parse() {
        assert_eq!("yahoo".parse::<SourceKind>().unwrap(), SourceKind::FileDaily);
        assert_eq!("Alpaca".parse::<SourceKind>().unwrap(), SourceKind::FileIntraday);
        assert_eq!("clickhouse".parse::<SourceKind>().unwrap(), SourceKind::Warehouse);
        assert_eq!(
            "bloomberg".parse::<SourceKind>().unwrap_err(),
            UnknownSource("bloomberg".into())
        );
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for source in SourceKind::ALL {
            assert_eq!(source.to_string().parse::<SourceKind>().unwrap(), source);
        }
    }

    #[test]
    fn memory_store_serves_inserted_series() {
        let store = MemoryStore::new();
        let s = TimeSeries::from_daily(vec![(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1.0)])
            .unwrap();
        store.insert_series("SPY", SourceKind::FileDaily, &s);

        assert!(store.fetch("SPY", SourceKind::FileDaily).is_ok());
        assert!(matches!(
            store.fetch("SPY", SourceKind::FileIntraday),
            Err(DataError::SymbolNotFound { .. })
        ));
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn restricted_store_refuses_other_sources() {
        let store = MemoryStore::only(&[SourceKind::FileDaily]);
        assert!(store.supports(SourceKind::FileDaily));
        assert!(!store.supports(SourceKind::Warehouse));
    }
}
