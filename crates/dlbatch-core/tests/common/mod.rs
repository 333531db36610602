//! Shared fixtures: a throwaway run directory and a `sh -c` stand-in downloader.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use dlbatch_core::config::BatchConfig;
use dlbatch_core::job::Job;
use dlbatch_core::supervisor::CommandBuilder;
use tokio::process::Command;

/// Runs `sh -c <script> sh <url>`: the script sees the job URL as `$1`.
pub struct Script(pub String);

impl CommandBuilder for Script {
    fn build(&self, job: &Job) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.0).arg("sh").arg(job.as_str());
        cmd
    }
}

pub fn script(body: impl Into<String>) -> Arc<dyn CommandBuilder> {
    Arc::new(Script(body.into()))
}

/// Config with every path inside `dir`, no pacing, and a generous timeout.
pub fn config_in(dir: &Path) -> BatchConfig {
    BatchConfig {
        input_file: dir.join("list.txt"),
        download_dir: dir.join("downloads"),
        worker_count: 2,
        check_interval_secs: 0.0,
        job_timeout_secs: 30,
        track_log: dir.join("logs").join("track_log.txt"),
        failed_log: dir.join("logs").join("failed_tracks.txt"),
        ..BatchConfig::default()
    }
}

/// File contents, or "" if the file does not exist.
pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

pub fn jobs(urls: &[&str]) -> Vec<Job> {
    urls.iter().map(|u| Job::new(*u)).collect()
}
