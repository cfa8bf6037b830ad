//! Process-mode workers: one child process per chunk.
//!
//! The parent re-invokes its own binary as `corrlab worker`, writes a JSON
//! `ChunkJob` to the child's stdin and reads a JSON `ChunkOutput` from its
//! stdout. Children log to stderr, which is inherited. At most `workers`
//! children run at once.

use rayon::prelude::*;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use corrlab_runner::{run_chunk_job, ChunkJob, ChunkOutput, EngineError, ProcessFanout, RunConfig};

use crate::stores::{build_exclude, build_store};

pub struct SubprocessWorkers {
    exe: PathBuf,
    config: PathBuf,
    synthetic: Option<u64>,
}

impl SubprocessWorkers {
    pub fn new(config: PathBuf, synthetic: Option<u64>) -> std::io::Result<Self> {
        Ok(Self {
            exe: std::env::current_exe()?,
            config,
            synthetic,
        })
    }

    fn run_one(&self, job: &ChunkJob) -> Result<ChunkOutput, EngineError> {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("worker").arg("--config").arg(&self.config);
        if let Some(seed) = self.synthetic {
            cmd.arg("--synthetic").arg("--seed").arg(seed.to_string());
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EngineError::Worker(format!("spawn: {e}")))?;

        let payload =
            serde_json::to_vec(job).map_err(|e| EngineError::Worker(format!("encode job: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| EngineError::Worker(format!("write job: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| EngineError::Worker(format!("wait: {e}")))?;
        if !output.status.success() {
            return Err(EngineError::Worker(format!(
                "{} candidates from window {}: exited with {}",
                job.candidates.len(),
                job.window,
                output.status
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Worker(format!("decode output: {e}")))
    }
}

impl ProcessFanout for SubprocessWorkers {
    fn run_chunks(
        &self,
        jobs: Vec<ChunkJob>,
        workers: usize,
    ) -> Result<Vec<ChunkOutput>, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        pool.install(|| jobs.par_iter().map(|job| self.run_one(job)).collect())
    }
}

/// Body of `corrlab worker`: one job in on stdin, one output out on stdout.
pub fn run_worker(config: &RunConfig, synthetic: Option<u64>) -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let job: ChunkJob = serde_json::from_str(&input)?;

    let store = build_store(config, synthetic)?;
    let exclude = build_exclude(config);
    let output = run_chunk_job(&job, store.as_ref(), exclude.as_ref());
    tracing::debug!(
        window = %job.window,
        candidates = job.candidates.len(),
        pairs = output.pairs.len(),
        "chunk done"
    );

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer(&mut lock, &output)?;
    lock.flush()?;
    Ok(())
}
