//! Jobs run by the compile pool and the launch worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        JobId(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A boxed closure plus bookkeeping.
pub(crate) struct Job {
    pub(crate) id: JobId,
    func: Box<dyn FnOnce() + Send + 'static>,
    submitted: Instant,
}

impl Job {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Job {
            id: JobId::next(),
            func: Box::new(f),
            submitted: Instant::now(),
        }
    }

    /// Time spent queued before a worker picked the job up.
    pub fn queued_for(&self) -> Duration {
        self.submitted.elapsed()
    }

    pub fn run(self) {
        (self.func)();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("submitted", &self.submitted)
            .finish()
    }
}
