//! Downloader command line.

use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

use crate::config::BatchConfig;
use crate::job::Job;

/// Builds the process launched for one job.
///
/// The supervisor owns stdio, process group and kill-on-drop settings;
/// implementors only choose the program and its arguments.
pub trait CommandBuilder: Send + Sync {
    fn build(&self, job: &Job) -> Command;
}

/// Invocation of the external downloader for one URL.
///
/// The downloader runs with one internal thread because jobs are already
/// parallel at the pool level, and with `--overwrite skip` so re-runs report
/// existing files instead of fetching them again.
#[derive(Debug, Clone)]
pub struct DownloaderCommand {
    pub program: String,
    pub max_retries: u32,
    pub output_template: String,
    pub cookies_file: PathBuf,
}

impl DownloaderCommand {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self {
            program: cfg.downloader.program.clone(),
            max_retries: cfg.downloader.max_retries,
            output_template: cfg.output_template(),
            cookies_file: cfg.cookies_file.clone(),
        }
    }

    pub fn args(&self, job: &Job) -> Vec<OsString> {
        vec![
            "download".into(),
            job.as_str().into(),
            "--threads".into(),
            "1".into(),
            "--max-retries".into(),
            self.max_retries.to_string().into(),
            "--output".into(),
            self.output_template.clone().into(),
            "--overwrite".into(),
            "skip".into(),
            "--scan-for-songs".into(),
            "--log-level".into(),
            "DEBUG".into(),
            "--cookie-file".into(),
            self.cookies_file.clone().into_os_string(),
        ]
    }

    /// Command line for display, as printed when the job starts.
    pub fn command_line(&self, job: &Job) -> String {
        display_line(self.build(job).as_std())
    }
}

/// Program and arguments joined by spaces (not shell-quoted).
pub(crate) fn display_line(cmd: &std::process::Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandBuilder for DownloaderCommand {
    fn build(&self, job: &Job) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(job));
        cmd
    }
}
