//! CorrLab CLI: correlation passes and persisted object inspection.
//!
//! Commands:
//! - `run`: run a correlation pass from a TOML config and save ranked mains
//! - `cache status`: list saved mains and the exclude list
//! - `worker`: internal process-mode worker, JSON over stdin/stdout

mod stores;
mod worker;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use corrlab_core::data::load_exclude_list;
use corrlab_core::domain::MainSecurity;
use corrlab_runner::{run_pass, ExecutionMode, PassReport, RunConfig, SecurityStore};

use crate::stores::{build_exclude, build_store, DEFAULT_SEED};
use crate::worker::{run_worker, SubprocessWorkers};

#[derive(Parser)]
#[command(
    name = "corrlab",
    about = "CorrLab CLI: find the most correlated securities for a set of main series"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a correlation pass and save each ranked main.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Override run.mode: sequential, process, or thread.
        #[arg(long)]
        mode: Option<ExecutionMode>,

        /// Override run.workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Use a seeded synthetic market instead of the configured source.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Seed for --synthetic.
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Matches to print per main and window.
        #[arg(long, default_value_t = 5)]
        show: usize,
    },
    /// Saved main inspection.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Process-mode worker. Reads a chunk job on stdin.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value_t = false)]
        synthetic: bool,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List saved mains and the exclude list size.
    Status {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            mode,
            workers,
            synthetic,
            seed,
            show,
        } => run_cmd(&config, mode, workers, synthetic.then_some(seed), show),
        Commands::Cache { action } => match action {
            CacheAction::Status { config } => run_cache_status(&config),
        },
        Commands::Worker {
            config,
            synthetic,
            seed,
        } => {
            let run_config = RunConfig::from_file(&config)?;
            run_worker(&run_config, synthetic.then_some(seed))
        }
    }
}

fn run_cmd(
    config_path: &Path,
    mode: Option<ExecutionMode>,
    workers: Option<usize>,
    synthetic: Option<u64>,
    show: usize,
) -> Result<()> {
    let mut config = RunConfig::from_file(config_path)?;
    if let Some(mode) = mode {
        config.run.mode = mode;
    }
    if workers.is_some() {
        config.run.workers = workers;
    }
    config.validate()?;

    let store = build_store(&config, synthetic)?;
    let exclude = build_exclude(&config);
    let fanout: Option<Arc<dyn corrlab_runner::ProcessFanout>> =
        if config.run.mode == ExecutionMode::Process {
            let workers = SubprocessWorkers::new(config_path.to_path_buf(), synthetic)
                .context("Failed to locate own executable for process workers")?;
            Some(Arc::new(workers))
        } else {
            None
        };

    let (report, mains) = run_pass(&config, store, exclude, fanout)?;
    print_summary(&report, &mains, show);
    Ok(())
}

fn print_summary(report: &PassReport, mains: &[MainSecurity], show: usize) {
    println!();
    println!("=== Correlation Pass ===");
    println!("Run:     {}", report.run_id.get(..12).unwrap_or(&report.run_id));
    println!("Source:  {}", report.summary.source);
    println!("Mode:    {}", report.summary.mode);
    println!();
    println!(
        "{:<8} {:>10} {:>10} {:>10} {:>10}",
        "Window", "Candidates", "Prepared", "Pairs", "Cache Hit"
    );
    println!("{}", "-".repeat(52));
    for w in &report.summary.windows {
        println!(
            "{:<8} {:>10} {:>10} {:>10} {:>9.1}%",
            w.window.to_string(),
            w.candidates,
            w.prepared,
            w.pairs,
            w.cache.hit_rate() * 100.0
        );
    }

    for main in mains {
        println!();
        println!("--- {} ---", main.identity());
        for w in &report.summary.windows {
            let (pos, neg) = main.ranked_for(w.window);
            if pos.is_empty() {
                println!("  {}: no correlations", w.window);
                continue;
            }
            let fmt = |list: &[corrlab_core::domain::CorrelatedEntity]| {
                list.iter()
                    .take(show)
                    .map(|e| format!("{} {:+.3}", e.symbol, e.correlation))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!("  {} +  {}", w.window, fmt(pos));
            println!("  {} -  {}", w.window, fmt(neg));
        }
    }

    println!();
    for path in &report.saved {
        println!("Saved: {}", path.display());
    }
}

fn run_cache_status(config_path: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    let dir = &config.run.output_dir;
    if !dir.exists() {
        println!("Output directory does not exist: {}", dir.display());
        return Ok(());
    }

    let store = SecurityStore::new(dir)?;
    let ids = store.list()?;
    let excluded = load_exclude_list(&config.exclude_list_path())?;

    println!("Store:    {}", dir.display());
    println!("Mains:    {}", ids.len());
    println!("Excluded: {}", excluded.len());
    if ids.is_empty() {
        return Ok(());
    }

    println!();
    println!(
        "{:<12} {:<14} {:<20} {:>8} {:<20}",
        "Main", "Run", "Saved", "Windows", "Top match"
    );
    println!("{}", "-".repeat(78));
    for id in &ids {
        match store.load(id) {
            Ok(Some(stored)) => {
                let main = &stored.main;
                let top = main
                    .positive_correlations
                    .iter()
                    .next_back()
                    .and_then(|(_, list)| list.first())
                    .map(|e| format!("{} {:+.3}", e.symbol, e.correlation))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<12} {:<14} {:<20} {:>8} {:<20}",
                    id,
                    stored.run_id.get(..12).unwrap_or(&stored.run_id),
                    stored.saved_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    main.positive_correlations.len(),
                    top
                );
            }
            Ok(None) => {}
            Err(e) => println!("{id:<12} (unreadable: {e:#})"),
        }
    }
    Ok(())
}
