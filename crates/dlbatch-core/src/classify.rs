//! Classify a finished downloader run from its output and exit status.
//!
//! Marker matching is case-sensitive and depends on the downloader's wording.
//! A clean exit without any marker counts as a download; that rule is a
//! heuristic and can misread ambiguous output.

use crate::supervisor::ExitStatus;
use std::fmt;

/// Output markers meaning the item was already present.
pub const SKIP_MARKERS: [&str; 2] = ["Skipping", "already exists"];

/// Output marker meaning the item was fetched.
pub const DOWNLOAD_MARKER: &str = "Downloaded";

/// Terminal classification of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Skipped,
    Downloaded,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Skipped => "skipped",
            Outcome::Downloaded => "downloaded",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(output: &str, status: &ExitStatus) -> Outcome {
    if SKIP_MARKERS.iter().any(|m| output.contains(m)) {
        return Outcome::Skipped;
    }
    if output.contains(DOWNLOAD_MARKER) || status.success() {
        return Outcome::Downloaded;
    }
    Outcome::Failed
}
