//! Run-wide result aggregation.
//!
//! Counters, the failed-job list and both log files sit behind one async
//! mutex. Each write (a counter update plus its failed-log line, or one
//! transcript record) happens under a single acquisition, so transcript
//! records from different workers never interleave.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::classify::Outcome;
use crate::config::BatchConfig;
use crate::job::Job;

/// Counters and failed jobs accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    pub processed: usize,
    pub downloaded: usize,
    pub skipped: usize,
    /// Failed jobs in completion order.
    pub failed: Vec<Job>,
}

impl AggregateState {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Where the two plain-text logs live.
#[derive(Debug, Clone)]
pub struct LogPaths {
    /// Every job's output, one delimited record per job.
    pub transcript: PathBuf,
    /// Failed job URLs, one per line.
    pub failed: PathBuf,
}

impl LogPaths {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self {
            transcript: cfg.track_log.clone(),
            failed: cfg.failed_log.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ResultAggregator {
    logs: LogPaths,
    state: Mutex<AggregateState>,
}

impl ResultAggregator {
    pub fn new(logs: LogPaths) -> Self {
        Self {
            logs,
            state: Mutex::new(AggregateState::default()),
        }
    }

    pub fn logs(&self) -> &LogPaths {
        &self.logs
    }

    /// Count one finished job; failed jobs are also listed and written to the failed log.
    pub async fn record(&self, job: &Job, outcome: Outcome) {
        let mut state = self.state.lock().await;
        state.processed += 1;
        match outcome {
            Outcome::Downloaded => state.downloaded += 1,
            Outcome::Skipped => state.skipped += 1,
            Outcome::Failed => {
                state.failed.push(job.clone());
                let line = format!("{}\n", job);
                if let Err(e) = append(&self.logs.failed, line.as_bytes()).await {
                    tracing::warn!(job = %job, "write failed log {}: {:#}", self.logs.failed.display(), e);
                }
            }
        }
    }

    /// Append `\n\n==== <job> ====\n<output>` to the transcript log.
    pub async fn append_transcript(&self, job: &Job, output: &str) {
        let record = format!("\n\n==== {} ====\n{}", job, output);
        let _state = self.state.lock().await;
        if let Err(e) = append(&self.logs.transcript, record.as_bytes()).await {
            tracing::warn!(job = %job, "write transcript {}: {:#}", self.logs.transcript.display(), e);
        }
    }

    pub async fn snapshot(&self) -> AggregateState {
        self.state.lock().await.clone()
    }

    /// Drain the failed list for a retry pass.
    ///
    /// The drained jobs are also taken back out of `processed`, so a retried
    /// job is counted once with its final outcome and
    /// `processed == downloaded + skipped + failed` keeps holding.
    pub async fn take_failed(&self) -> Vec<Job> {
        let mut state = self.state.lock().await;
        let failed = std::mem::take(&mut state.failed);
        state.processed -= failed.len();
        failed
    }

    /// Create or truncate the failed log.
    pub async fn reset_failed_log(&self) -> Result<()> {
        let _state = self.state.lock().await;
        if let Some(parent) = non_empty_parent(&self.logs.failed) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::File::create(&self.logs.failed)
            .await
            .with_context(|| format!("truncate failed log {}", self.logs.failed.display()))?;
        Ok(())
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

async fn append(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}
