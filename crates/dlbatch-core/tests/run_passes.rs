//! Integration tests: full runs over a stand-in downloader (initial pass + retry pass).

#![cfg(unix)]

mod common;

use dlbatch_core::control::CancellationSignal;
use dlbatch_core::job::Job;
use dlbatch_core::orchestrator::RunOrchestrator;
use dlbatch_core::progress::{Pass, ProgressSender};
use tempfile::tempdir;

/// A downloads, B fails on its first attempt only, C is already present.
fn flaky_b_script(state_dir: &std::path::Path) -> String {
    format!(
        r#"case "$1" in
  */a) echo "Downloaded \"Artist - A\"" ;;
  */b) if [ -f "{dir}/b.seen" ]; then echo "Downloaded \"Artist - B\""; else touch "{dir}/b.seen"; echo "rate limited" >&2; exit 1; fi ;;
  */c) echo "Skipping Artist - C (file already exists)" ;;
  *) exit 2 ;;
esac"#,
        dir = state_dir.display()
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_job_is_retried_once_and_recovers() {
    let dir = tempdir().unwrap();
    let cfg = common::config_in(dir.path());
    let failed_log = cfg.failed_log.clone();
    let track_log = cfg.track_log.clone();

    let orchestrator = RunOrchestrator::new(cfg, CancellationSignal::new(), ProgressSender::disabled())
        .with_command_builder(common::script(flaky_b_script(dir.path())));
    let report = orchestrator
        .run_jobs(common::jobs(&["https://x/a", "https://x/b", "https://x/c"]))
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.summaries.len(), 2);

    let first = &report.summaries[0];
    assert_eq!(first.pass, Pass::Initial);
    assert_eq!(first.queued, 3);
    assert_eq!(first.processed, 3);
    assert_eq!(first.state.downloaded, 1);
    assert_eq!(first.state.skipped, 1);
    assert_eq!(first.state.failed, vec![Job::new("https://x/b")]);

    let retry = &report.summaries[1];
    assert_eq!(retry.pass, Pass::Retry);
    assert_eq!(retry.queued, 1);
    assert_eq!(retry.processed, 1);

    let s = &report.final_state;
    assert_eq!(s.downloaded, 2);
    assert_eq!(s.skipped, 1);
    assert_eq!(s.failed_count(), 0);
    assert_eq!(s.processed, s.downloaded + s.skipped + s.failed_count());

    assert_eq!(common::read(&failed_log), "");
    let transcript = common::read(&track_log);
    assert_eq!(transcript.matches("==== https://x/b ====").count(), 2);
    assert_eq!(transcript.matches("==== https://x/a ====").count(), 1);
    assert!(transcript.contains("rate limited\n"));
    assert!(dir.path().join("downloads").is_dir());
}

#[tokio::test]
async fn no_retry_pass_when_nothing_failed() {
    let dir = tempdir().unwrap();
    let orchestrator = RunOrchestrator::new(
        common::config_in(dir.path()),
        CancellationSignal::new(),
        ProgressSender::disabled(),
    )
    .with_command_builder(common::script("echo Downloaded"));
    let report = orchestrator
        .run_jobs(common::jobs(&["https://x/1", "https://x/2"]))
        .await
        .unwrap();
    assert_eq!(report.summaries.len(), 1);
    assert!(!report.retried());
    assert_eq!(report.final_state.downloaded, 2);
}

#[tokio::test]
async fn persistent_failure_stays_listed_after_retry() {
    let dir = tempdir().unwrap();
    let cfg = common::config_in(dir.path());
    let failed_log = cfg.failed_log.clone();
    let orchestrator = RunOrchestrator::new(cfg, CancellationSignal::new(), ProgressSender::disabled())
        .with_command_builder(common::script("echo 'HTTP 404'; exit 1"));
    let report = orchestrator
        .run_jobs(common::jobs(&["https://x/gone"]))
        .await
        .unwrap();

    assert!(report.retried());
    assert_eq!(report.final_state.processed, 1);
    assert_eq!(report.final_state.failed, vec![Job::new("https://x/gone")]);
    // Truncated before the retry pass, so the URL is listed once.
    assert_eq!(common::read(&failed_log), "https://x/gone\n");
}

#[tokio::test]
async fn run_loads_input_file_and_truncates_stale_failed_log() {
    let dir = tempdir().unwrap();
    let cfg = common::config_in(dir.path());
    std::fs::write(
        &cfg.input_file,
        "https://x/one\nnot a url\n\n  https://x/two  \nspotify:track:3\n",
    )
    .unwrap();
    std::fs::create_dir_all(cfg.failed_log.parent().unwrap()).unwrap();
    std::fs::write(&cfg.failed_log, "https://stale/from-last-run\n").unwrap();
    let failed_log = cfg.failed_log.clone();

    let orchestrator = RunOrchestrator::new(cfg, CancellationSignal::new(), ProgressSender::disabled())
        .with_command_builder(common::script("echo \"Downloaded $1\""));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.summaries[0].queued, 2);
    assert_eq!(report.final_state.downloaded, 2);
    assert_eq!(common::read(&failed_log), "");
}

#[tokio::test]
async fn missing_downloader_fails_jobs_without_aborting() {
    let dir = tempdir().unwrap();
    let mut cfg = common::config_in(dir.path());
    cfg.downloader.program = dir.path().join("no-such-downloader").display().to_string();
    let track_log = cfg.track_log.clone();

    let orchestrator = RunOrchestrator::new(cfg, CancellationSignal::new(), ProgressSender::disabled());
    let report = orchestrator
        .run_jobs(common::jobs(&["https://x/1", "https://x/2", "https://x/3"]))
        .await
        .unwrap();

    assert!(report.retried());
    assert_eq!(report.final_state.processed, 3);
    assert_eq!(report.final_state.failed_count(), 3);
    assert!(common::read(&track_log).contains("EXCEPTION: failed to launch downloader"));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_work() {
    let dir = tempdir().unwrap();
    let mut cfg = common::config_in(dir.path());
    cfg.worker_count = 0;
    let orchestrator = RunOrchestrator::new(cfg, CancellationSignal::new(), ProgressSender::disabled())
        .with_command_builder(common::script("echo Downloaded"));
    assert!(orchestrator.run_jobs(common::jobs(&["https://x/1"])).await.is_err());
    assert!(!dir.path().join("downloads").exists());
}
