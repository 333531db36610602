//! Job identifiers and the input list loader.

use anyhow::{Context, Result};
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

/// Line prefixes accepted as job URLs; anything else in the input list is ignored.
pub const ACCEPTED_SCHEMES: [&str; 2] = ["http://", "https://"];

/// One unit of work: an opaque URL handed to the downloader.
///
/// Cheap to clone; the same job is shared between the queue, the failed
/// list, and progress events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job(Arc<str>);

impl Job {
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Job {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns the job for one input line, or None if the line is not a URL.
pub fn parse_line(line: &str) -> Option<Job> {
    let url = line.trim();
    ACCEPTED_SCHEMES
        .iter()
        .any(|scheme| url.starts_with(scheme))
        .then(|| Job::new(url))
}

/// Reads jobs from any line source, preserving order.
pub fn load_jobs<R: BufRead>(reader: R) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    for line in reader.lines() {
        let line = line.context("read job list line")?;
        if let Some(job) = parse_line(&line) {
            jobs.push(job);
        }
    }
    Ok(jobs)
}

pub fn load_jobs_from_path(path: &Path) -> Result<Vec<Job>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open job list {}", path.display()))?;
    let jobs = load_jobs(std::io::BufReader::new(file))
        .with_context(|| format!("read job list {}", path.display()))?;
    tracing::debug!(count = jobs.len(), path = %path.display(), "loaded job list");
    Ok(jobs)
}
