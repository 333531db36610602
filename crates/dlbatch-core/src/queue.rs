//! Shared FIFO of pending jobs, drained concurrently by the workers of one pass.
//!
//! Taking is non-blocking: an empty queue tells a worker to exit, it never
//! waits for more work.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::job::Job;

#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            pending: Mutex::new(jobs.into_iter().collect()),
        }
    }

    // Holders never leave the deque half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job at the tail.
    pub fn enqueue(&self, job: Job) {
        self.lock().push_back(job);
    }

    /// Remove and return the head, or None if the queue is empty.
    pub fn try_dequeue(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
