//! Pass runner: wires config, universe, mains, engine, and persistence.
//!
//! `run_pass()` is the entry point used by the CLI:
//! 1. resolve the effective source and fail early if the store cannot serve it
//! 2. build the candidate list (universe minus the exclude list)
//! 3. prepare every main and slice it per window
//! 4. run the correlation pass in the configured mode
//! 5. save each ranked main as JSON

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use corrlab_core::data::{load_exclude_list, ExcludeListSink, SeriesStore, Universe, UniverseError};
use corrlab_core::domain::MainSecurity;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::engine::{
    default_workers, resolve_source, run_correlation_pass, CorrelationEngine, EngineError,
    EngineOptions, PassRequest, ProcessFanout, RunSummary,
};
use crate::mains::build_mains;
use crate::store::SecurityStore;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("universe error: {0}")]
    Universe(#[from] UniverseError),

    #[error("exclude list {path}: {source}")]
    ExcludeList {
        path: String,
        source: std::io::Error,
    },

    #[error("no usable main series")]
    NoMains,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Outcome of one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub run_id: RunId,
    pub summary: RunSummary,
    pub mains: Vec<String>,
    pub saved: Vec<PathBuf>,
}

/// Candidate symbols for the run: the configured universe minus the exclude list.
pub fn load_candidates(config: &RunConfig) -> Result<Vec<String>, RunError> {
    let universe = if config.universe.debug {
        Universe::debug()
    } else {
        let mut symbols: Vec<String> = match &config.universe.file {
            Some(path) => Universe::from_file(path)?
                .all_tickers()
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        symbols.extend(config.universe.symbols.iter().cloned());
        Universe::from_symbols(symbols)
    };

    let path = config.exclude_list_path();
    let excluded = load_exclude_list(&path).map_err(|source| RunError::ExcludeList {
        path: path.display().to_string(),
        source,
    })?;
    let candidates = universe.candidates(&excluded);
    info!(
        universe = universe.ticker_count(),
        excluded = excluded.len(),
        candidates = candidates.len(),
        "candidates loaded"
    );
    Ok(candidates)
}

/// Engine options from the run section.
pub fn engine_options(config: &RunConfig) -> EngineOptions {
    EngineOptions {
        mode: config.run.mode,
        workers: config.run.workers.unwrap_or_else(default_workers),
        top_k: config.run.top_k,
    }
}

/// Run a full pass and persist the ranked mains. Returns the mains too, for
/// callers that want them without reading the store back.
pub fn run_pass(
    config: &RunConfig,
    store: Arc<dyn SeriesStore>,
    exclude: Arc<dyn ExcludeListSink>,
    fanout: Option<Arc<dyn ProcessFanout>>,
) -> Result<(PassReport, Vec<MainSecurity>), RunError> {
    let run_id = config.run_id();
    let source = resolve_source(&config.data.source, config.data.download, config.data.use_warehouse)?;

    let mut engine = CorrelationEngine::new(Arc::clone(&store), Arc::clone(&exclude), engine_options(config));
    if let Some(fanout) = fanout {
        engine = engine.with_fanout(fanout);
    }
    engine.check_source(source)?;

    let candidates = load_candidates(config)?;
    let mut mains = build_mains(config, store.as_ref(), exclude.as_ref(), source)?;
    if mains.is_empty() {
        return Err(RunError::NoMains);
    }

    let request = PassRequest {
        universe: &candidates,
        windows: &config.run.windows,
        end_date: config.data.end_date,
        source: &config.data.source,
        download: config.data.download,
        use_warehouse: config.data.use_warehouse,
        mode: config.run.mode,
    };
    let summary = run_correlation_pass(&engine, &mut mains, &request)?;

    let out = SecurityStore::new(&config.run.output_dir)?;
    let saved = mains
        .iter()
        .map(|m| out.save(m, &run_id, config.run.top_k))
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!(
        run_id = run_id.get(..12).unwrap_or(&run_id),
        mains = mains.len(),
        pairs = summary.total_pairs(),
        output = %out.dir().display(),
        "pass complete"
    );

    let report = PassReport {
        run_id,
        summary,
        mains: mains.iter().map(|m| m.identity().to_string()).collect(),
        saved,
    };
    Ok((report, mains))
}
