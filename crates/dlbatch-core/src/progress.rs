//! Progress events for live reporting.
//!
//! Workers and the orchestrator push events into a bounded channel; the CLI
//! drains it and prints. Without a receiver, events are dropped.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::aggregate::AggregateState;
use crate::classify::Outcome;
use crate::job::Job;
use crate::supervisor::ExitStatus;

/// Which pool pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Initial,
    Retry,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Initial => f.write_str("initial"),
            Pass::Retry => f.write_str("retry"),
        }
    }
}

/// Aggregate counters at the end of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pass: Pass,
    /// Jobs queued for this pass.
    pub queued: usize,
    /// Jobs processed in this pass (fewer than `queued` after cancellation).
    pub processed: usize,
    /// Cumulative state over the run so far.
    pub state: AggregateState,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PassStarted {
        pass: Pass,
        jobs: usize,
    },
    JobStarted {
        worker: usize,
        job: Job,
        command: String,
    },
    OutputLine {
        worker: usize,
        line: String,
    },
    JobFinished {
        worker: usize,
        job: Job,
        outcome: Outcome,
        status: ExitStatus,
        elapsed: Duration,
    },
    PassFinished(PassSummary),
}

/// Cloneable handle for sending progress events; a no-op when disabled.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is printing; the run continues.
            let _ = tx.send(event).await;
        }
    }

    /// Send without waiting. Returns false when the event was dropped
    /// because the channel is full or closed.
    pub fn try_send(&self, event: ProgressEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.try_send(event).is_ok(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sender_is_a_noop() {
        ProgressSender::disabled()
            .send(ProgressEvent::PassStarted {
                pass: Pass::Initial,
                jobs: 0,
            })
            .await;
    }

    #[tokio::test]
    async fn closed_receiver_does_not_block() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = ProgressSender::new(tx);
        sender
            .send(ProgressEvent::OutputLine {
                worker: 1,
                line: "x".to_string(),
            })
            .await;
    }

    #[test]
    fn try_send_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = ProgressSender::new(tx);
        let line = |n: usize| ProgressEvent::OutputLine {
            worker: 1,
            line: n.to_string(),
        };
        assert!(sender.try_send(line(1)));
        assert!(!sender.try_send(line(2)));
        match rx.try_recv() {
            Ok(ProgressEvent::OutputLine { line, .. }) => assert_eq!(line, "1"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
