use super::job::Job;
use super::worker::{Worker, WorkerId, WorkerStats};
use crate::config::Config;
use crate::error::{Error, Result};
use crossbeam_deque::{Injector, Stealer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Work-stealing pool that runs codegen jobs.
pub struct CompilePool {
    workers: Vec<WorkerHandle>,
    injector: Arc<Injector<Job>>,
    shutdown: Arc<AtomicBool>,
    num_threads: usize,
    pending_jobs: Arc<AtomicUsize>,
    next_wake: AtomicUsize,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
    stats: Arc<WorkerStats>,
}

/// Totals across all compile workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub jobs_executed: u64,
    pub jobs_stolen: u64,
    pub jobs_panicked: u64,
}

impl CompilePool {
    pub fn new(config: &Config) -> Result<Self> {
        let num_threads = config.compile_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 compile thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending_jobs = Arc::new(AtomicUsize::new(0));

        let workers: Vec<Worker> = (0..num_threads).map(Worker::new).collect();
        let stealers: Vec<Stealer<Job>> = workers.iter().map(|w| w.local_queue.stealer()).collect();

        let mut handles = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let stats = worker.stats.clone();
            let stealers_clone = stealers.clone();
            let injector_clone = injector.clone();
            let shutdown_clone = shutdown.clone();
            let pending_clone = pending_jobs.clone();
            let name = format!("{}-compile-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let spawned = builder.spawn(move || {
                worker.run(stealers_clone, injector_clone, shutdown_clone, pending_clone);
            });

            let thread = match spawned {
                Ok(thread) => thread,
                Err(e) => {
                    // stop whatever already started before bailing
                    shutdown.store(true, Ordering::Release);
                    for handle in &mut handles {
                        stop_worker(handle);
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            };

            let unparker = thread.thread().clone();

            handles.push(WorkerHandle {
                id,
                thread: Some(thread),
                unparker,
                stats,
            });
        }

        log::debug!("compile pool started with {} workers", num_threads);

        Ok(Self {
            workers: handles,
            injector,
            shutdown,
            num_threads,
            pending_jobs,
            next_wake: AtomicUsize::new(0),
        })
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending_jobs.fetch_add(1, Ordering::AcqRel);
        self.injector.push(Job::new(f));

        // round-robin wake so parked workers pick up bursts
        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.num_threads;
        if let Some(worker) = self.workers.get(idx) {
            worker.unparker.unpark();
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn stats(&self) -> PoolStats {
        self.workers.iter().fold(PoolStats::default(), |mut acc, w| {
            acc.jobs_executed += w.stats.jobs_executed.load(Ordering::Relaxed);
            acc.jobs_stolen += w.stats.jobs_stolen.load(Ordering::Relaxed);
            acc.jobs_panicked += w.stats.jobs_panicked.load(Ordering::Relaxed);
            acc
        })
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        for worker in &mut self.workers {
            stop_worker(worker);
        }
    }
}

fn stop_worker(worker: &mut WorkerHandle) {
    worker.unparker.unpark();
    if let Some(thread) = worker.thread.take() {
        if thread.join().is_err() {
            log::error!("compile worker {} exited with a panic", worker.id);
        }
    }
}

impl Drop for CompilePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CompilePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilePool")
            .field("num_threads", &self.num_threads)
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn pool(threads: usize) -> CompilePool {
        let config = Config::builder().compile_threads(threads).build().unwrap();
        CompilePool::new(&config).unwrap()
    }

    #[test]
    fn test_runs_all_jobs() {
        let pool = pool(4);
        let (tx, rx) = unbounded();

        for i in 0..100 {
            let tx = tx.clone();
            pool.execute(move || {
                tx.send(i).unwrap();
            });
        }

        let mut seen: Vec<i32> = (0..100)
            .map(|_| rx.recv_timeout(Duration::from_secs(10)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_survives_panicking_job() {
        let pool = pool(1);
        let (tx, rx) = unbounded();

        pool.execute(|| panic!("boom"));
        pool.execute(move || tx.send(()).unwrap());

        assert!(rx.recv_timeout(Duration::from_secs(10)).is_ok());
        assert_eq!(pool.stats().jobs_panicked, 1);
    }

    #[test]
    fn test_shutdown_joins_workers() {
        let mut pool = pool(2);
        assert_eq!(pool.num_threads(), 2);
        pool.shutdown();
        // second shutdown (from Drop) must be harmless
        pool.shutdown();
    }
}
