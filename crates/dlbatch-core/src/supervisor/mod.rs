//! Run one downloader process per job and turn it into a `RunResult`.
//!
//! stdout and stderr are read line by line and merged into one transcript in
//! arrival order. The line loop races the job deadline and the run-wide
//! cancellation signal; whichever fires first ends supervision. Launch and
//! read failures never escape: they become an `Internal` status with the
//! error text appended to the transcript.

mod command;
mod terminate;

pub use command::{CommandBuilder, DownloaderCommand};

use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::classify::{classify, Outcome};
use crate::config::BatchConfig;
use crate::control::CancellationSignal;
use crate::job::Job;
use crate::progress::{ProgressEvent, ProgressSender};

/// Exit code reported for launch/read failures.
pub const INTERNAL_ERROR_CODE: i32 = -999;
/// Exit code reported when the job deadline killed the process.
pub const TIMEOUT_CODE: i32 = -1;
/// Exit code reported when cancellation terminated the process.
pub const CANCELLED_CODE: i32 = -2;
/// Exit code reported when the process died from a signal we did not send.
pub const SIGNALLED_CODE: i32 = -3;

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Process exited on its own with this code.
    Exited(i32),
    /// Process was terminated by a signal from elsewhere (no exit code).
    Signalled,
    /// Killed after exceeding the per-job timeout.
    TimedOut,
    /// Terminated because the run was cancelled.
    Cancelled,
    /// Could not launch or read the process.
    Internal,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// Numeric status; synthetic outcomes map to negative sentinels.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signalled => SIGNALLED_CODE,
            ExitStatus::TimedOut => TIMEOUT_CODE,
            ExitStatus::Cancelled => CANCELLED_CODE,
            ExitStatus::Internal => INTERNAL_ERROR_CODE,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        status.code().map(ExitStatus::Exited).unwrap_or(ExitStatus::Signalled)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit {}", code),
            ExitStatus::Signalled => f.write_str("killed by signal"),
            ExitStatus::TimedOut => f.write_str("timed out"),
            ExitStatus::Cancelled => f.write_str("cancelled"),
            ExitStatus::Internal => f.write_str("internal error"),
        }
    }
}

/// Failure to launch or read the downloader.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to launch downloader: {0}")]
    Spawn(#[source] io::Error),
    #[error("downloader {0} pipe missing")]
    MissingPipe(&'static str),
    #[error("reading downloader output: {0}")]
    Read(#[source] io::Error),
    #[error("waiting for downloader: {0}")]
    Wait(#[source] io::Error),
}

/// Terminal result of supervising one job.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub job: Job,
    pub status: ExitStatus,
    /// Merged stdout/stderr plus any TIMEOUT / EXCEPTION note.
    pub output: String,
    pub timed_out: bool,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub timeout: Duration,
    /// Time between SIGTERM and SIGKILL on cancellation.
    pub terminate_grace: Duration,
}

impl SupervisorSettings {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self {
            timeout: cfg.job_timeout(),
            terminate_grace: cfg.terminate_grace(),
        }
    }
}

/// What ended one round of the supervision loop.
enum Event {
    Cancelled,
    Deadline,
    Line(Option<io::Result<String>>),
    Exited(io::Result<std::process::ExitStatus>),
}

pub struct ProcessSupervisor {
    builder: Arc<dyn CommandBuilder>,
    settings: SupervisorSettings,
    cancel: CancellationSignal,
}

impl ProcessSupervisor {
    pub fn new(
        builder: Arc<dyn CommandBuilder>,
        settings: SupervisorSettings,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            builder,
            settings,
            cancel,
        }
    }

    /// Launch the downloader for `job` and supervise it to completion.
    /// Each output line is forwarded to `progress` as it arrives.
    pub async fn run(&self, job: &Job, worker: usize, progress: &ProgressSender) -> RunResult {
        let started = Instant::now();
        let mut output = String::new();
        let status = match self.supervise(job, worker, progress, &mut output).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(worker, job = %job, "{}", e);
                output.push_str(&format!("EXCEPTION: {}\n", e));
                ExitStatus::Internal
            }
        };
        let outcome = classify(&output, &status);
        RunResult {
            job: job.clone(),
            status,
            timed_out: status == ExitStatus::TimedOut,
            outcome,
            output,
            elapsed: started.elapsed(),
        }
    }

    async fn supervise(
        &self,
        job: &Job,
        worker: usize,
        progress: &ProgressSender,
        output: &mut String,
    ) -> Result<ExitStatus, SupervisorError> {
        let mut cmd = self.builder.build(job);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let command = command::display_line(cmd.as_std());
        tracing::debug!(worker, job = %job, %command, "launching downloader");
        progress
            .send(ProgressEvent::JobStarted {
                worker,
                job: job.clone(),
                command,
            })
            .await;

        let mut child = cmd.spawn().map_err(SupervisorError::Spawn)?;
        let pgid = child.id();
        let deadline = tokio::time::sleep(self.settings.timeout);
        tokio::pin!(deadline);

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate::kill(&mut child, pgid).await;
            return Err(SupervisorError::MissingPipe("stdout/stderr"));
        };
        let (line_tx, mut line_rx) = mpsc::channel(64);
        let readers = [
            tokio::spawn(forward_lines(stdout, line_tx.clone())),
            tokio::spawn(forward_lines(stderr, line_tx)),
        ];

        let mut streams_open = true;
        let result = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Event::Cancelled,
                _ = &mut deadline => Event::Deadline,
                line = line_rx.recv(), if streams_open => Event::Line(line),
                status = child.wait(), if !streams_open => Event::Exited(status),
            };
            match event {
                Event::Line(Some(Ok(line))) => record_line(output, line, job, worker, progress),
                Event::Line(Some(Err(e))) => {
                    terminate::kill(&mut child, pgid).await;
                    break Err(SupervisorError::Read(e));
                }
                Event::Line(None) => streams_open = false,
                Event::Exited(status) => break status.map(ExitStatus::from).map_err(SupervisorError::Wait),
                Event::Deadline => {
                    tracing::info!(worker, job = %job, "timed out after {:?}", self.settings.timeout);
                    terminate::kill(&mut child, pgid).await;
                    break Ok(ExitStatus::TimedOut);
                }
                Event::Cancelled => {
                    tracing::info!(worker, job = %job, "terminating downloader on cancel");
                    terminate::terminate(&mut child, pgid, self.settings.terminate_grace).await;
                    break Ok(ExitStatus::Cancelled);
                }
            }
        };

        // Keep whatever was already read before the process was stopped.
        line_rx.close();
        while let Ok(Ok(line)) = line_rx.try_recv() {
            record_line(output, line, job, worker, progress);
        }
        for reader in readers {
            reader.abort();
        }

        if result.as_ref().ok() == Some(&ExitStatus::TimedOut) {
            output.push_str(&format!("TIMEOUT after {}s\n", self.settings.timeout.as_secs()));
        }
        result
    }
}

/// Append `line` to the transcript and forward it for display.
///
/// Never waits on the progress channel: a stalled consumer must not hold up
/// the deadline or cancellation. Lines it cannot take are only dropped from
/// the live view, never from the transcript.
fn record_line(output: &mut String, line: String, job: &Job, worker: usize, progress: &ProgressSender) {
    tracing::debug!(worker, job = %job, "{}", line);
    output.push_str(&line);
    output.push('\n');
    progress.try_send(ProgressEvent::OutputLine { worker, line });
}

/// Forward each line of `stream` (lossy UTF-8, line ending stripped) until EOF or error.
async fn forward_lines<R>(stream: R, tx: mpsc::Sender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
