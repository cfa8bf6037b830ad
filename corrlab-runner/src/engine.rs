//! Correlation pass orchestration.
//!
//! For each window, in order:
//! 1. deduplicate the candidate list (first occurrence wins)
//! 2. resolve each candidate through the cache, falling back to the preparer
//! 3. correlate it against every main that is not the same entity
//! 4. record the value in that main's map for the window
//! 5. after every candidate is done, rank each main's map (top-K) and clear it
//!
//! Steps 2-4 run in one of three modes. `Sequential` and `Thread` share the
//! engine's cache; `Process` hands chunks of candidates to isolated workers,
//! each with a private cache, and merges their result lists afterwards. All
//! three produce the same correlation maps.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use corrlab_core::data::{ExcludeListSink, SeriesStore, SourceKind, UnknownSource};
use corrlab_core::domain::{CorrelationMap, MainKind, MainSecurity, PreparedSeries, Window};
use corrlab_core::{correlate, rank_all, CacheStats, Preparer, ValidationCache, DEFAULT_TOP_K};

// ── Modes and options ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Process,
    Thread,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Process => "process",
            ExecutionMode::Thread => "thread",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutionMode::Sequential),
            "process" | "multiprocessing" => Ok(ExecutionMode::Process),
            "thread" | "threads" => Ok(ExecutionMode::Thread),
            other => Err(format!(
                "unknown execution mode '{other}' (expected sequential, process, or thread)"
            )),
        }
    }
}

/// A quarter of the available cores, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 4)
        .unwrap_or(1)
        .max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub mode: ExecutionMode,
    pub workers: usize,
    pub top_k: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            workers: default_workers(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    UnknownSource(#[from] UnknownSource),

    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

// ── Worker protocol ──────────────────────────────────────────────────

/// One correlation result, addressed by the main's index in the pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub main_index: usize,
    pub symbol: String,
    pub correlation: f64,
}

/// What a worker needs to know about a main: who it is and its window series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainProbe {
    pub kind: MainKind,
    pub series: Option<PreparedSeries>,
}

/// A chunk of candidates for one window, self-contained so it can cross a
/// process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkJob {
    pub window: Window,
    pub source: SourceKind,
    pub candidates: Vec<String>,
    pub mains: Vec<MainProbe>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkOutput {
    pub pairs: Vec<PairCorrelation>,
    pub prepared: usize,
    pub cache: CacheStats,
}

pub fn probes_for(mains: &[MainSecurity], window: Window) -> Vec<MainProbe> {
    mains
        .iter()
        .map(|m| MainProbe {
            kind: m.kind.clone(),
            series: m.prepared_for(window).cloned(),
        })
        .collect()
}

/// Cache first, then the preparer. Only successful preparations are cached.
pub fn resolve(
    symbol: &str,
    source: SourceKind,
    cache: &ValidationCache,
    preparer: &Preparer<'_>,
) -> Option<Arc<PreparedSeries>> {
    if let Some(hit) = cache.get(symbol) {
        return Some(hit);
    }
    preparer
        .prepare(symbol, source)
        .ok()
        .map(|prepared| cache.set(symbol, prepared))
}

/// Correlate one candidate against every probe that is not itself.
pub fn correlate_candidate(
    symbol: &str,
    series: &PreparedSeries,
    probes: &[MainProbe],
) -> Vec<PairCorrelation> {
    probes
        .iter()
        .enumerate()
        .filter(|(_, probe)| !probe.kind.is_same_entity(symbol))
        .filter_map(|(main_index, probe)| {
            let main_series = probe.series.as_ref()?;
            match correlate(main_series, series) {
                Ok(correlation) => Some(PairCorrelation {
                    main_index,
                    symbol: symbol.to_string(),
                    correlation,
                }),
                Err(reason) => {
                    debug!(symbol, main = probe.kind.identity(), %reason, "pair skipped");
                    None
                }
            }
        })
        .collect()
}

/// Run a chunk against `cache`.
pub fn correlate_chunk(
    job: &ChunkJob,
    store: &dyn SeriesStore,
    exclude: &dyn ExcludeListSink,
    cache: &ValidationCache,
) -> ChunkOutput {
    let preparer = Preparer::new(store, exclude);
    let mut output = ChunkOutput::default();
    for symbol in &job.candidates {
        if let Some(series) = resolve(symbol, job.source, cache, &preparer) {
            output.prepared += 1;
            output
                .pairs
                .extend(correlate_candidate(symbol, &series, &job.mains));
        }
    }
    output
}

/// Run a chunk the way an isolated worker does: with a fresh, private cache.
pub fn run_chunk_job(
    job: &ChunkJob,
    store: &dyn SeriesStore,
    exclude: &dyn ExcludeListSink,
) -> ChunkOutput {
    let cache = ValidationCache::new();
    let mut output = correlate_chunk(job, store, exclude, &cache);
    output.cache = cache.stats();
    output
}

/// Runs chunk jobs in isolated workers and returns one output per job.
///
/// Any failure is fatal for the pass: a lost chunk would silently drop
/// candidates from the maps.
pub trait ProcessFanout: Send + Sync {
    fn run_chunks(&self, jobs: Vec<ChunkJob>, workers: usize)
        -> Result<Vec<ChunkOutput>, EngineError>;
}

/// In-process fan-out: each chunk on its own pool thread with a private cache.
pub struct IsolatedWorkers {
    store: Arc<dyn SeriesStore>,
    exclude: Arc<dyn ExcludeListSink>,
}

impl IsolatedWorkers {
    pub fn new(store: Arc<dyn SeriesStore>, exclude: Arc<dyn ExcludeListSink>) -> Self {
        Self { store, exclude }
    }
}

impl ProcessFanout for IsolatedWorkers {
    fn run_chunks(
        &self,
        jobs: Vec<ChunkJob>,
        workers: usize,
    ) -> Result<Vec<ChunkOutput>, EngineError> {
        let pool = build_pool(workers)?;
        Ok(pool.install(|| {
            jobs.par_iter()
                .map(|job| run_chunk_job(job, self.store.as_ref(), self.exclude.as_ref()))
                .collect()
        }))
    }
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, EngineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| EngineError::ThreadPool(e.to_string()))
}

/// Split `candidates` into at most `workers` contiguous chunks.
pub fn chunk_candidates(candidates: &[String], workers: usize) -> Vec<Vec<String>> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let size = candidates.len().div_ceil(workers.max(1));
    candidates.chunks(size).map(<[String]>::to_vec).collect()
}

/// First occurrence order, duplicates dropped.
pub fn dedupe(candidates: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

// ── Summaries ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub window: Window,
    pub candidates: usize,
    pub prepared: usize,
    pub pairs: usize,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub source: SourceKind,
    pub mode: ExecutionMode,
    pub windows: Vec<WindowSummary>,
}

impl RunSummary {
    pub fn total_pairs(&self) -> usize {
        self.windows.iter().map(|w| w.pairs).sum()
    }
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct CorrelationEngine {
    store: Arc<dyn SeriesStore>,
    exclude: Arc<dyn ExcludeListSink>,
    cache: Arc<ValidationCache>,
    fanout: Option<Arc<dyn ProcessFanout>>,
    options: EngineOptions,
}

impl CorrelationEngine {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        exclude: Arc<dyn ExcludeListSink>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            exclude,
            cache: Arc::new(ValidationCache::new()),
            fanout: None,
            options,
        }
    }

    /// Share an existing cache (e.g. across several passes in one process).
    pub fn with_cache(mut self, cache: Arc<ValidationCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the in-process isolated workers used by `Process` mode.
    pub fn with_fanout(mut self, fanout: Arc<dyn ProcessFanout>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    /// Fail before any work when the store cannot serve `source`.
    pub fn check_source(&self, source: SourceKind) -> Result<(), EngineError> {
        if self.store.supports(source) {
            Ok(())
        } else {
            Err(UnknownSource(format!("{source} (store '{}')", self.store.name())).into())
        }
    }

    /// Correlate every candidate against every main for one window, leaving
    /// the results in each main's `all_correlations[window]`.
    pub fn correlate_window(
        &self,
        mains: &mut [MainSecurity],
        candidates: &[String],
        window: Window,
        source: SourceKind,
    ) -> Result<WindowSummary, EngineError> {
        let candidates = dedupe(candidates);
        let probes = probes_for(mains, window);
        for probe in probes.iter().filter(|p| p.series.is_none()) {
            debug!(main = probe.kind.identity(), %window, "main has no series for window");
        }

        let before = self.cache.stats();
        let (pairs, prepared, worker_cache) = if probes.iter().all(|p| p.series.is_none()) {
            (0, 0, CacheStats::default())
        } else {
            match self.options.mode {
                ExecutionMode::Sequential => {
                    self.run_sequential(mains, &candidates, &probes, window, source)
                }
                ExecutionMode::Thread => self.run_threaded(mains, &candidates, &probes, window, source)?,
                ExecutionMode::Process => {
                    self.run_process(mains, &candidates, probes, window, source)?
                }
            }
        };

        let after = self.cache.stats();
        let cache = CacheStats {
            hits: after.hits - before.hits,
            misses: after.misses - before.misses,
        }
        .merge(worker_cache);

        Ok(WindowSummary {
            window,
            candidates: candidates.len(),
            prepared,
            pairs,
            cache,
        })
    }

    fn run_sequential(
        &self,
        mains: &mut [MainSecurity],
        candidates: &[String],
        probes: &[MainProbe],
        window: Window,
        source: SourceKind,
    ) -> (usize, usize, CacheStats) {
        let preparer = Preparer::new(self.store.as_ref(), self.exclude.as_ref());
        let (mut pairs, mut prepared) = (0, 0);
        for symbol in candidates {
            let Some(series) = resolve(symbol, source, &self.cache, &preparer) else {
                continue;
            };
            prepared += 1;
            for pair in correlate_candidate(symbol, &series, probes) {
                mains[pair.main_index].record_correlation(window, pair.symbol, pair.correlation);
                pairs += 1;
            }
        }
        (pairs, prepared, CacheStats::default())
    }

    fn run_threaded(
        &self,
        mains: &mut [MainSecurity],
        candidates: &[String],
        probes: &[MainProbe],
        window: Window,
        source: SourceKind,
    ) -> Result<(usize, usize, CacheStats), EngineError> {
        // One lock per (main, window) map.
        let maps: Vec<Mutex<CorrelationMap>> = mains
            .iter_mut()
            .map(|m| Mutex::new(m.all_correlations.remove(&window).unwrap_or_default()))
            .collect();

        let pool = build_pool(self.options.workers)?;
        let preparer = Preparer::new(self.store.as_ref(), self.exclude.as_ref());
        let (pairs, prepared) = pool.install(|| {
            candidates
                .par_iter()
                .map(|symbol| {
                    let Some(series) = resolve(symbol, source, &self.cache, &preparer) else {
                        return (0, 0);
                    };
                    let found = correlate_candidate(symbol, &series, probes);
                    let n = found.len();
                    for pair in found {
                        maps[pair.main_index]
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(pair.symbol, pair.correlation);
                    }
                    (n, 1)
                })
                .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
        });

        for (main, map) in mains.iter_mut().zip(maps) {
            let map = map.into_inner().unwrap_or_else(PoisonError::into_inner);
            if !map.is_empty() {
                main.all_correlations.insert(window, map);
            }
        }
        Ok((pairs, prepared, CacheStats::default()))
    }

    fn run_process(
        &self,
        mains: &mut [MainSecurity],
        candidates: &[String],
        probes: Vec<MainProbe>,
        window: Window,
        source: SourceKind,
    ) -> Result<(usize, usize, CacheStats), EngineError> {
        let jobs: Vec<ChunkJob> = chunk_candidates(candidates, self.options.workers)
            .into_iter()
            .map(|chunk| ChunkJob {
                window,
                source,
                candidates: chunk,
                mains: probes.clone(),
            })
            .collect();
        let expected = jobs.len();

        let outputs = match &self.fanout {
            Some(fanout) => fanout.run_chunks(jobs, self.options.workers)?,
            None => IsolatedWorkers::new(Arc::clone(&self.store), Arc::clone(&self.exclude))
                .run_chunks(jobs, self.options.workers)?,
        };
        if outputs.len() != expected {
            return Err(EngineError::Worker(format!(
                "{expected} chunks sent, {} results returned",
                outputs.len()
            )));
        }

        // Every index is checked before the first write, so a bad output
        // leaves all maps untouched.
        if let Some(bad) = outputs
            .iter()
            .flat_map(|o| &o.pairs)
            .find(|p| p.main_index >= mains.len())
        {
            return Err(EngineError::Worker(format!(
                "result for unknown main index {}",
                bad.main_index
            )));
        }

        // Single-threaded merge after every worker has finished.
        let (mut pairs, mut prepared, mut cache) = (0, 0, CacheStats::default());
        for output in outputs {
            prepared += output.prepared;
            cache = cache.merge(output.cache);
            for pair in output.pairs {
                mains[pair.main_index].record_correlation(window, pair.symbol, pair.correlation);
                pairs += 1;
            }
        }
        Ok((pairs, prepared, cache))
    }

    /// Correlate then rank, one window at a time.
    pub fn run(
        &self,
        mains: &mut [MainSecurity],
        candidates: &[String],
        windows: &[Window],
        source: SourceKind,
    ) -> Result<RunSummary, EngineError> {
        self.check_source(source)?;
        let mut summaries = Vec::with_capacity(windows.len());
        for &window in windows {
            let summary = self.correlate_window(mains, candidates, window, source)?;
            rank_all(mains, window, self.options.top_k);
            info!(
                %window,
                mode = %self.options.mode,
                candidates = summary.candidates,
                prepared = summary.prepared,
                pairs = summary.pairs,
                cache_hits = summary.cache.hits,
                cache_misses = summary.cache.misses,
                "window complete"
            );
            summaries.push(summary);
        }
        Ok(RunSummary {
            source,
            mode: self.options.mode,
            windows: summaries,
        })
    }
}

// ── Pass entry point ─────────────────────────────────────────────────

/// Inputs of one correlation pass.
#[derive(Debug, Clone)]
pub struct PassRequest<'a> {
    pub universe: &'a [String],
    pub windows: &'a [Window],
    pub end_date: chrono::NaiveDate,
    pub source: &'a str,
    pub download: bool,
    pub use_warehouse: bool,
    pub mode: ExecutionMode,
}

/// The effective source: `download` wins, then `use_warehouse`, then `source`.
pub fn resolve_source(
    source: &str,
    download: bool,
    use_warehouse: bool,
) -> Result<SourceKind, EngineError> {
    if download {
        Ok(SourceKind::LiveDownload)
    } else if use_warehouse {
        Ok(SourceKind::Warehouse)
    } else {
        Ok(source.parse::<SourceKind>()?)
    }
}

/// Run a full pass. Windows starting after `end_date` have no data and are
/// skipped. On return every main holds ranked lists per window and empty maps.
pub fn run_correlation_pass(
    engine: &CorrelationEngine,
    mains: &mut [MainSecurity],
    request: &PassRequest<'_>,
) -> Result<RunSummary, EngineError> {
    let source = resolve_source(request.source, request.download, request.use_warehouse)?;
    engine.check_source(source)?;

    let windows: Vec<Window> = request
        .windows
        .iter()
        .copied()
        .filter(|w| {
            let usable = w.start_date() <= request.end_date;
            if !usable {
                warn!(window = %w, end_date = %request.end_date, "window starts after end date, skipped");
            }
            usable
        })
        .collect();

    let options = EngineOptions {
        mode: request.mode,
        ..engine.options()
    };
    let engine = CorrelationEngine {
        store: Arc::clone(&engine.store),
        exclude: Arc::clone(&engine.exclude),
        cache: Arc::clone(&engine.cache),
        fanout: engine.fanout.clone(),
        options,
    };

    info!(
        mains = mains.len(),
        candidates = request.universe.len(),
        windows = windows.len(),
        %source,
        mode = %request.mode,
        "starting correlation pass"
    );
    engine.run(mains, request.universe, &windows, source)
}
