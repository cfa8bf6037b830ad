//! CorrLab Core: series preparation, validation cache, alignment, correlation, ranking.
//!
//! This crate holds everything a correlation pass needs below orchestration:
//! - Domain types (time series, windows, main securities, correlated entities)
//! - Data stores (Parquet files, live download, warehouse, memory, synthetic)
//! - Validation and detrending with explicit rejections
//! - A concurrent memo of prepared series
//! - Inner-join alignment and Pearson correlation
//! - Top-K ranking of a window's correlation map

pub mod align;
pub mod cache;
pub mod correlation;
pub mod data;
pub mod domain;
pub mod prepare;
pub mod ranking;

pub use cache::{CacheStats, ValidationCache};
pub use correlation::{correlate, pearson, AlignmentDegenerate};
pub use prepare::{Preparer, Rejection, WINDOW_SIZE};
pub use ranking::{rank, rank_all, top_k, DEFAULT_TOP_K};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the engine shares across worker
    /// threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::TimeSeries>();
        require_sync::<domain::TimeSeries>();
        require_send::<domain::PreparedSeries>();
        require_sync::<domain::PreparedSeries>();
        require_send::<domain::MainSecurity>();
        require_sync::<domain::MainSecurity>();
        require_send::<domain::Window>();
        require_sync::<domain::Window>();

        require_send::<ValidationCache>();
        require_sync::<ValidationCache>();
        require_send::<Rejection>();
        require_sync::<Rejection>();

        require_send::<data::FileStore>();
        require_sync::<data::FileStore>();
        require_send::<data::MemoryStore>();
        require_sync::<data::MemoryStore>();
        require_send::<data::SyntheticStore>();
        require_sync::<data::SyntheticStore>();
        require_send::<data::FileExcludeList>();
        require_sync::<data::FileExcludeList>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
    }

    /// Stores and sinks are used as trait objects by the engine.
    #[test]
    fn store_and_sink_are_object_safe() {
        fn _takes(_: &dyn data::SeriesStore, _: &dyn data::ExcludeListSink) {}
        let store = data::MemoryStore::new();
        _takes(&store, &data::NullExcludeList);
    }
}
