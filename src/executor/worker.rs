// compile worker thread
use super::job::Job;
use crate::util::Backoff;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub jobs_executed: AtomicU64,
    pub jobs_stolen: AtomicU64,
    pub jobs_panicked: AtomicU64,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Job>,
    pub stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    // main loop
    pub fn run(
        &self,
        stealers: Vec<Stealer<Job>>,
        injector: Arc<Injector<Job>>,
        shutdown: Arc<AtomicBool>,
        pending: Arc<AtomicUsize>,
    ) {
        let backoff = Backoff::new();

        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            // local -> global -> steal
            if let Some(job) = self.find_job(&stealers, &injector) {
                backoff.reset();
                self.execute_job(job);
                pending.fetch_sub(1, Ordering::AcqRel);
            } else if backoff.is_completed() {
                // unparked by submit
                thread::park_timeout(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    fn find_job(&self, stealers: &[Stealer<Job>], injector: &Injector<Job>) -> Option<Job> {
        if let Some(job) = self.local_queue.pop() {
            return Some(job);
        }

        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(job) => return Some(job),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Job>]) -> Option<Job> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() < 2 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(job) => {
                        self.stats.jobs_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(job);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_job(&self, job: Job) {
        let id = job.id;
        log::trace!("worker {} picked job {:?} after {:?}", self.id, id, job.queued_for());

        // compile jobs catch their own panics; this only guards the thread
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.run()));

        if result.is_err() {
            log::error!("job {:?} panicked on compile worker {}", id, self.id);
            self.stats.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        }

        self.stats.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }
}
