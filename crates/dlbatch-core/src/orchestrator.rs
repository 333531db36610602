//! Whole-run flow: initial pass, summary, one retry pass over failures.
//!
//! The retry pass only runs when the first pass left failed jobs and the run
//! was not cancelled. Cancellation at any point ends the run with whatever
//! partial state the aggregator holds.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::aggregate::{AggregateState, LogPaths, ResultAggregator};
use crate::config::BatchConfig;
use crate::control::CancellationSignal;
use crate::job::{self, Job};
use crate::pool::{PoolSettings, WorkerPool};
use crate::progress::{Pass, PassSummary, ProgressEvent, ProgressSender};
use crate::queue::JobQueue;
use crate::supervisor::{CommandBuilder, DownloaderCommand, ProcessSupervisor, SupervisorSettings};

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per pass that ran (one or two).
    pub summaries: Vec<PassSummary>,
    pub final_state: AggregateState,
    pub cancelled: bool,
}

impl RunReport {
    pub fn retried(&self) -> bool {
        self.summaries.iter().any(|s| s.pass == Pass::Retry)
    }
}

pub struct RunOrchestrator {
    config: BatchConfig,
    builder: Arc<dyn CommandBuilder>,
    cancel: CancellationSignal,
    progress: ProgressSender,
}

impl RunOrchestrator {
    /// Orchestrator launching the configured downloader.
    pub fn new(config: BatchConfig, cancel: CancellationSignal, progress: ProgressSender) -> Self {
        let builder = Arc::new(DownloaderCommand::from_config(&config));
        Self {
            config,
            builder,
            cancel,
            progress,
        }
    }

    /// Replace the process launched per job.
    pub fn with_command_builder(mut self, builder: Arc<dyn CommandBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Load the configured input list and run it.
    pub async fn run(&self) -> Result<RunReport> {
        let jobs = job::load_jobs_from_path(&self.config.input_file)?;
        self.run_jobs(jobs).await
    }

    pub async fn run_jobs(&self, jobs: Vec<Job>) -> Result<RunReport> {
        self.config.validate()?;
        self.prepare_output().await?;

        let aggregator = Arc::new(ResultAggregator::new(LogPaths::from_config(&self.config)));
        aggregator.reset_failed_log().await?;
        let pool = self.build_pool(Arc::clone(&aggregator));

        let mut summaries = Vec::with_capacity(2);
        let initial = Arc::new(JobQueue::from_jobs(jobs));
        summaries.push(self.run_pass(&pool, &aggregator, Pass::Initial, initial).await?);

        if self.cancel.is_cancelled() {
            tracing::info!("run cancelled; skipping retry pass");
        } else if aggregator.snapshot().await.failed_count() > 0 {
            aggregator.reset_failed_log().await?;
            let retry = aggregator.take_failed().await;
            tracing::info!(count = retry.len(), "retrying failed jobs");
            let queue = Arc::new(JobQueue::from_jobs(retry));
            summaries.push(self.run_pass(&pool, &aggregator, Pass::Retry, queue).await?);
        }

        let final_state = aggregator.snapshot().await;
        let cancelled = self.cancel.is_cancelled();
        tracing::info!(
            processed = final_state.processed,
            downloaded = final_state.downloaded,
            skipped = final_state.skipped,
            failed = final_state.failed_count(),
            cancelled,
            "run finished"
        );
        Ok(RunReport {
            summaries,
            final_state,
            cancelled,
        })
    }

    /// Create the download directory and the parent of the transcript log.
    async fn prepare_output(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.download_dir)
            .await
            .with_context(|| format!("create download dir {}", self.config.download_dir.display()))?;
        if let Some(parent) = self.config.track_log.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        Ok(())
    }

    fn build_pool(&self, aggregator: Arc<ResultAggregator>) -> WorkerPool {
        let supervisor = ProcessSupervisor::new(
            Arc::clone(&self.builder),
            SupervisorSettings::from_config(&self.config),
            self.cancel.clone(),
        );
        WorkerPool::new(
            PoolSettings::from_config(&self.config),
            supervisor,
            aggregator,
            self.cancel.clone(),
            self.progress.clone(),
        )
    }

    async fn run_pass(
        &self,
        pool: &WorkerPool,
        aggregator: &ResultAggregator,
        pass: Pass,
        queue: Arc<JobQueue>,
    ) -> Result<PassSummary> {
        let queued = queue.len();
        tracing::info!(%pass, jobs = queued, "pass started");
        self.progress
            .send(ProgressEvent::PassStarted { pass, jobs: queued })
            .await;

        let report = pool.run_pass(queue).await?;

        let summary = PassSummary {
            pass,
            queued,
            processed: report.processed,
            state: aggregator.snapshot().await,
        };
        tracing::info!(
            %pass,
            processed = report.processed,
            cancelled = report.cancelled,
            "pass finished"
        );
        self.progress
            .send(ProgressEvent::PassFinished(summary.clone()))
            .await;
        Ok(summary)
    }
}
