//! Memo of prepared series, keyed by symbol.
//!
//! Entries are `Arc`s swapped in whole under a write lock, so a reader sees
//! either no entry or a complete one. Concurrent populate-on-miss is allowed:
//! both callers prepare, the last `set` wins, and either value is valid since
//! a symbol's prepared series does not change within a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::PreparedSeries;

/// Hit/miss counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups that hit; zero before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }

    /// Combine counters from several caches (process-mode workers).
    pub fn merge(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: RwLock<HashMap<String, Arc<PreparedSeries>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `symbol`, counting exactly one hit or one miss.
    pub fn get(&self, symbol: &str) -> Option<Arc<PreparedSeries>> {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or replace. Returns the stored handle.
    pub fn set(&self, symbol: &str, series: PreparedSeries) -> Arc<PreparedSeries> {
        let entry = Arc::new(series);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string(), Arc::clone(&entry));
        entry
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeSeries;
    use chrono::NaiveDate;

    fn series(v: f64) -> PreparedSeries {
        PreparedSeries::from_detrended(
            TimeSeries::from_daily(vec![
                (NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), v),
                (NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), -v),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn set_then_get_returns_same_series() {
        let cache = ValidationCache::new();
        cache.set("SPY", series(1.0));
        assert_eq!(*cache.get("SPY").unwrap(), series(1.0));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 0 });
    }

    #[test]
    fn each_lookup_counts_once() {
        let cache = ValidationCache::new();
        assert!(cache.get("A").is_none());
        assert!(cache.get("A").is_none());
        cache.set("A", series(1.0));
        assert!(cache.get("A").is_some());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
        assert!((cache.stats().hit_rate() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn last_writer_wins() {
        let cache = ValidationCache::new();
        cache.set("A", series(1.0));
        cache.set("A", series(2.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get("A").unwrap(), series(2.0));
    }

    #[test]
    fn concurrent_populate_keeps_one_whole_entry() {
        let cache = Arc::new(ValidationCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    if cache.get("X").is_none() {
                        cache.set("X", series(f64::from(i) + 1.0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
        let entry = cache.get("X").unwrap();
        assert_eq!(entry.values()[0], -entry.values()[1]);
        assert_eq!(cache.stats().lookups(), 9);
    }
}
