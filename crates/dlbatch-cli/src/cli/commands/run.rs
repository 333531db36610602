//! `dlbatch run` – run the job list through the worker pool.

use anyhow::Result;
use dlbatch_core::aggregate::AggregateState;
use dlbatch_core::classify::Outcome;
use dlbatch_core::config::BatchConfig;
use dlbatch_core::control::CancellationSignal;
use dlbatch_core::job;
use dlbatch_core::orchestrator::RunOrchestrator;
use dlbatch_core::progress::{Pass, PassSummary, ProgressEvent, ProgressSender};
use dlbatch_core::supervisor::DownloaderCommand;

use crate::cli::EXIT_INTERRUPTED;

pub async fn run_batch(cfg: BatchConfig, dry_run: bool) -> Result<i32> {
    if dry_run {
        print_dry_run(&cfg)?;
        return Ok(0);
    }

    let cancel = CancellationSignal::new();
    let signal_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            println!("\nInterrupt received, stopping workers...");
            cancel.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressEvent>(256);
    let progress_handle = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            print_event(&event);
        }
    });

    println!("Loading job list from {}...", cfg.input_file.display());
    let orchestrator = RunOrchestrator::new(cfg, cancel, ProgressSender::new(progress_tx));
    let result = orchestrator.run().await;
    drop(orchestrator);
    let _ = progress_handle.await;
    signal_handle.abort();

    let report = result?;
    if report.cancelled {
        println!("Stopped early; retry pass skipped.");
        tracing::info!("run interrupted");
        return Ok(EXIT_INTERRUPTED);
    }
    println!("\nDone, all jobs processed.");
    Ok(0)
}

fn print_dry_run(cfg: &BatchConfig) -> Result<()> {
    let jobs = job::load_jobs_from_path(&cfg.input_file)?;
    let command = DownloaderCommand::from_config(cfg);
    for job in &jobs {
        println!("{}", command.command_line(job));
    }
    println!(
        "{} job(s), {} worker(s), {}s timeout per job",
        jobs.len(),
        cfg.worker_count,
        cfg.job_timeout_secs
    );
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::PassStarted { pass: Pass::Initial, jobs } => {
            println!("Queued {} job(s).", jobs);
        }
        ProgressEvent::PassStarted { pass: Pass::Retry, jobs } => {
            println!("\nRetrying {} failed job{}...\n", jobs, if *jobs == 1 { "" } else { "s" });
        }
        ProgressEvent::JobStarted { worker, job, command } => {
            println!("[Worker {}] Processing: {}", worker, job);
            println!("[Worker {}] Running: {}", worker, command);
        }
        ProgressEvent::OutputLine { worker, line } => {
            println!("[Worker {}] {}", worker, line);
        }
        ProgressEvent::JobFinished {
            worker,
            outcome,
            status,
            elapsed,
            ..
        } => {
            println!(
                "[Worker {}] {} ({}, {:.1}s)",
                worker,
                verdict(*outcome),
                status,
                elapsed.as_secs_f64()
            );
        }
        ProgressEvent::PassFinished(summary) => print!("{}", format_summary(summary)),
    }
}

fn verdict(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Downloaded => "Downloaded",
        Outcome::Skipped => "Skipped",
        Outcome::Failed => "Failed",
    }
}

fn format_summary(summary: &PassSummary) -> String {
    let PassSummary { pass, queued, processed, state } = summary;
    let AggregateState {
        processed: total,
        downloaded,
        skipped,
        ..
    } = state;
    format!(
        "\nSummary after {} pass ({} of {} queued job(s) run)\n  Processed:  {}\n  Downloaded: {}\n  Skipped:    {}\n  Failed:     {}\n",
        pass,
        processed,
        queued,
        total,
        downloaded,
        skipped,
        state.failed_count()
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlbatch_core::job::Job;

    #[test]
    fn summary_lists_cumulative_counts() {
        let summary = PassSummary {
            pass: Pass::Retry,
            queued: 2,
            processed: 1,
            state: AggregateState {
                processed: 5,
                downloaded: 3,
                skipped: 1,
                failed: vec![Job::new("https://x/b")],
            },
        };
        let text = format_summary(&summary);
        assert!(text.contains("after retry pass (1 of 2 queued job(s) run)"));
        assert!(text.contains("  Processed:  5\n"));
        assert!(text.contains("  Downloaded: 3\n"));
        assert!(text.contains("  Skipped:    1\n"));
        assert!(text.contains("  Failed:     1\n"));
    }

    #[test]
    fn verdict_words() {
        assert_eq!(verdict(Outcome::Downloaded), "Downloaded");
        assert_eq!(verdict(Outcome::Skipped), "Skipped");
        assert_eq!(verdict(Outcome::Failed), "Failed");
    }
}
