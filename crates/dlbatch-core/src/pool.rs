//! Fixed-size worker pool for one pass over a job queue.
//!
//! Workers are launched one by one with a stagger delay so the downloader is
//! not started N times at once. Each worker drains the shared queue until it
//! is empty or the run is cancelled; `run_pass` returns once all have exited.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::aggregate::ResultAggregator;
use crate::config::BatchConfig;
use crate::control::CancellationSignal;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::queue::JobQueue;
use crate::supervisor::{ExitStatus, ProcessSupervisor};

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Concurrent workers per pass (at least 1).
    pub workers: usize,
    /// Pause after each finished job.
    pub pacing: Duration,
    /// Delay between worker launches.
    pub stagger: Duration,
}

impl PoolSettings {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self {
            workers: cfg.worker_count,
            pacing: cfg.check_interval(),
            stagger: cfg.check_interval(),
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Jobs taken from the queue and recorded.
    pub processed: usize,
    /// Whether cancellation was set by the time the pass ended.
    pub cancelled: bool,
}

struct Worker {
    supervisor: ProcessSupervisor,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationSignal,
    progress: ProgressSender,
    pacing: Duration,
}

impl Worker {
    /// Dequeue → supervise → log → record → pace, until empty or cancelled.
    /// Returns the number of jobs this worker recorded.
    async fn run(&self, id: usize, queue: &JobQueue) -> usize {
        tracing::debug!(worker = id, "worker started");
        let mut processed = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(job) = queue.try_dequeue() else {
                break;
            };
            tracing::info!(worker = id, job = %job, "processing");

            let result = self.supervisor.run(&job, id, &self.progress).await;
            self.aggregator.append_transcript(&job, &result.output).await;
            self.aggregator.record(&job, result.outcome).await;
            processed += 1;

            tracing::info!(
                worker = id,
                job = %job,
                outcome = %result.outcome,
                status = %result.status,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "job finished"
            );
            self.progress
                .send(ProgressEvent::JobFinished {
                    worker: id,
                    job,
                    outcome: result.outcome,
                    status: result.status,
                    elapsed: result.elapsed,
                })
                .await;

            if result.status == ExitStatus::Cancelled {
                break;
            }
            if !self.cancel.sleep(self.pacing).await {
                break;
            }
        }
        tracing::debug!(worker = id, processed, "worker exited");
        processed
    }
}

pub struct WorkerPool {
    settings: PoolSettings,
    worker: Arc<Worker>,
}

impl WorkerPool {
    pub fn new(
        settings: PoolSettings,
        supervisor: ProcessSupervisor,
        aggregator: Arc<ResultAggregator>,
        cancel: CancellationSignal,
        progress: ProgressSender,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                supervisor,
                aggregator,
                cancel,
                progress,
                pacing: settings.pacing,
            }),
            settings,
        }
    }

    /// Run one pass over `queue`, blocking until every worker has exited.
    pub async fn run_pass(&self, queue: Arc<JobQueue>) -> Result<PassReport> {
        let workers = self.settings.workers.max(1);
        let cancel = &self.worker.cancel;
        let mut join_set = JoinSet::new();

        for id in 1..=workers {
            if id > 1 && !cancel.sleep(self.settings.stagger).await {
                break;
            }
            if queue.is_empty() || cancel.is_cancelled() {
                break;
            }
            let worker = Arc::clone(&self.worker);
            let queue = Arc::clone(&queue);
            join_set.spawn(async move { worker.run(id, &queue).await });
        }

        let mut processed = 0;
        while let Some(res) = join_set.join_next().await {
            processed += res.map_err(|e| anyhow::anyhow!("worker task join: {}", e))?;
        }

        Ok(PassReport {
            processed,
            cancelled: cancel.is_cancelled(),
        })
    }
}
