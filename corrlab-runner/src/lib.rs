//! CorrLab Runner: correlation pass orchestration, configuration, persistence.
//!
//! This crate builds on `corrlab-core` to provide:
//! - TOML run configuration with a content-hash run id
//! - The correlation engine (sequential, thread, and process modes)
//! - Main series construction for tickers, FRED-MD and FRED CSV series
//! - A JSON store of ranked mains
//! - `run_pass()`, the end-to-end entry point used by the CLI

pub mod config;
pub mod engine;
pub mod fred_md;
pub mod mains;
pub mod runner;
pub mod store;

pub use config::{ConfigError, MainSpec, RunConfig, RunId};
pub use engine::{
    default_workers, resolve_source, run_chunk_job, run_correlation_pass, ChunkJob, ChunkOutput,
    CorrelationEngine, EngineError, EngineOptions, ExecutionMode, IsolatedWorkers, MainProbe,
    PairCorrelation, PassRequest, ProcessFanout, RunSummary, WindowSummary,
};
pub use fred_md::{load_fred_csv, load_fred_md_metadata, FredMdDataset, FredMdMeta};
pub use mains::build_mains;
pub use runner::{engine_options, load_candidates, run_pass, PassReport, RunError};
pub use store::{SecurityStore, StoredMain};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn engine_is_send_sync() {
        assert_send::<CorrelationEngine>();
        assert_sync::<CorrelationEngine>();
        assert_send::<IsolatedWorkers>();
        assert_sync::<IsolatedWorkers>();
    }

    #[test]
    fn worker_protocol_is_send_sync() {
        assert_send::<ChunkJob>();
        assert_sync::<ChunkJob>();
        assert_send::<ChunkOutput>();
        assert_sync::<ChunkOutput>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<SecurityStore>();
        assert_sync::<SecurityStore>();
    }
}
