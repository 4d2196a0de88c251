//! The compile/execute pipeline.
//!
//! A flush runs in two phases. Phase 1 fingerprints every buffered record,
//! schedules one compilation per distinct sub-task on the compile pool and
//! joins on their outcomes. Phase 2 hands the records, in enqueue order, to
//! the single launch worker, where each one waits for its artifact and runs
//! it. Compilation order is arbitrary; execution order is not.

use crate::cache::{ArtifactCache, Lookup, Reservation};
use crate::config::{Config, FailurePolicy};
use crate::error::{Error, Result};
use crate::executor::{CompilePool, LaunchWorker, PanicHandler, PoolStats};
use crate::hash::{ContentHash, Fingerprint};
use crate::ir::{CodeGen, Kernel};
use crate::record::LaunchRecord;
use crate::telemetry::{FlushTrace, FlushTracer, Metrics, MetricsSnapshot, TraceKind};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Monotonic flush number; 0 when nothing was flushed.
    pub flush: u64,
    pub records: usize,
    /// Distinct sub-tasks compiled by this flush.
    pub compiled: usize,
    /// Records served by an artifact kept from an earlier flush.
    pub cache_hits: usize,
    /// Records that shared a compilation with an earlier record of this flush.
    pub dedup_hits: usize,
    /// Sub-tasks whose content hash equals that of a different sub-task seen
    /// earlier in this flush. A pair of colliding sub-tasks counts once.
    pub collisions: usize,
    pub compile_time: Duration,
    pub total_time: Duration,
}

type CompileOutcome = Result<()>;
type DispatchOutcome = (usize, Result<()>);

pub struct ExecutionQueue<K: Kernel, G: CodeGen<K>> {
    config: Config,
    pending: VecDeque<LaunchRecord<K>>,
    cache: Arc<ArtifactCache<K::Context>>,
    codegen: Arc<G>,
    compile_pool: CompilePool,
    launch_worker: LaunchWorker,
    panic_handler: Arc<PanicHandler>,
    metrics: Arc<Metrics>,
    tracer: Arc<FlushTracer>,
    flush_count: u64,
}

impl<K: Kernel, G: CodeGen<K>> ExecutionQueue<K, G> {
    pub fn new(config: Config, codegen: G) -> Result<Self> {
        config.validate()?;

        let compile_pool = CompilePool::new(&config)?;
        let launch_worker = LaunchWorker::new(&config)?;

        Ok(Self {
            pending: VecDeque::new(),
            cache: Arc::new(ArtifactCache::new()),
            codegen: Arc::new(codegen),
            compile_pool,
            launch_worker,
            panic_handler: Arc::new(PanicHandler::new(config.panic_strategy)),
            metrics: Arc::new(Metrics::new()),
            tracer: Arc::new(FlushTracer::new(config.telemetry_enabled())),
            flush_count: 0,
            config,
        })
    }

    /// Buffer a record. Nothing is compiled until [`synchronize`](Self::synchronize).
    pub fn enqueue(&mut self, record: LaunchRecord<K>) {
        self.pending.push_back(record);
    }

    /// Compile everything buffered, then execute it in enqueue order.
    ///
    /// Blocks until every record has run or failed. On failure the error
    /// names the first failing kernel and sub-task; records that did not
    /// depend on a failed artifact still ran unless the failure policy is
    /// [`FailurePolicy::AbortFlush`].
    pub fn synchronize(&mut self) -> Result<FlushReport> {
        if self.pending.is_empty() {
            return Ok(FlushReport::default());
        }

        self.flush_count += 1;
        let flush = self.flush_count;
        self.metrics.record_flush();
        self.tracer.begin(flush);

        let result = self.flush(flush);

        self.pending.clear();
        let evicted = self.cache.end_flush(self.config.cache_policy);
        self.tracer.finish();
        log::debug!("flush {} released {} cache entries", flush, evicted);

        result
    }

    fn flush(&mut self, flush: u64) -> Result<FlushReport> {
        let started = Instant::now();
        let total = self.pending.len();
        log::info!("Flushing execution queue with {} tasks", total);

        let mut report = FlushReport {
            flush,
            records: total,
            ..FlushReport::default()
        };

        // Phase 1: fingerprint and schedule unique compilations.
        let (compile_tx, compile_rx) = unbounded();
        let mut fingerprints = Vec::with_capacity(total);
        let mut seen: HashMap<ContentHash, Fingerprint> = HashMap::new();
        let mut collided: HashSet<Fingerprint> = HashSet::new();

        for record in &self.pending {
            let fp = Fingerprint::of(&*record.task);

            match seen.get(&fp.content_hash()) {
                Some(first) if first.collides_with(&fp) && collided.insert(fp.clone()) => {
                    log::warn!(
                        "content hash {} collides: `{}` vs `{}`; compiling both",
                        fp.content_hash(),
                        first.summary(),
                        fp.summary()
                    );
                    self.metrics.record_hash_collision();
                    report.collisions += 1;
                }
                Some(_) => {}
                None => {
                    seen.insert(fp.content_hash(), fp.clone());
                }
            }

            match self.cache.reserve(&fp, flush) {
                Reservation::Scheduled => {
                    self.spawn_compile(flush, record, fp.clone(), compile_tx.clone());
                    report.compiled += 1;
                }
                Reservation::InFlight => {
                    self.metrics.record_dedup_hit();
                    report.dedup_hits += 1;
                }
                Reservation::Cached => {
                    self.metrics.record_cache_hit();
                    report.cache_hits += 1;
                }
            }

            fingerprints.push(fp);
        }
        drop(compile_tx);

        let compile_started = Instant::now();
        let (compile_failures, dispatch_rx) = if self.config.pipelined {
            // slots of this flush settle by the compile deadline at the latest,
            // so dispatch may wait that long for them
            let compile_deadline = compile_started + self.config.compile_timeout;
            let dispatch_rx = self.submit_dispatches(flush, fingerprints, Some(compile_deadline))?;
            let failures = self.join_compilations(&compile_rx, report.compiled, compile_started);
            (failures, dispatch_rx)
        } else {
            let failures = self.join_compilations(&compile_rx, report.compiled, compile_started);

            if !failures.is_empty() && self.config.failure_policy == FailurePolicy::AbortFlush {
                log::error!(
                    "aborting flush {}: {} compilation(s) failed, nothing dispatched",
                    flush,
                    failures.len()
                );
                return Err(Error::FlushFailed {
                    failed: total,
                    total,
                    first: Box::new(failures.into_iter().next().unwrap_or_else(|| {
                        Error::Other("compilation failed".into())
                    })),
                });
            }

            let dispatch_rx = self.submit_dispatches(flush, fingerprints, None)?;
            (failures, dispatch_rx)
        };
        report.compile_time = compile_started.elapsed();
        log::info!(
            "Compiled {} unique tasks in {:.3} ms",
            report.compiled,
            report.compile_time.as_secs_f64() * 1000.0
        );

        // Phase 2 barrier: everything handed to the launch worker has run.
        self.launch_worker.flush()?;
        report.total_time = started.elapsed();

        let mut dispatch_failures: Vec<(usize, Error)> = dispatch_rx
            .try_iter()
            .filter_map(|(seq, outcome)| outcome.err().map(|e| (seq, e)))
            .collect();
        dispatch_failures.sort_by_key(|(seq, _)| *seq);

        if compile_failures.is_empty() && dispatch_failures.is_empty() {
            return Ok(report);
        }

        let failed = dispatch_failures.len();
        let first = compile_failures
            .into_iter()
            .next()
            .or_else(|| dispatch_failures.into_iter().next().map(|(_, e)| e))
            .unwrap_or_else(|| Error::Other("flush failed".into()));

        log::error!("flush {}: {} of {} launches failed", flush, failed, total);
        Err(Error::FlushFailed {
            failed,
            total,
            first: Box::new(first),
        })
    }

    fn spawn_compile(
        &self,
        flush: u64,
        record: &LaunchRecord<K>,
        fp: Fingerprint,
        tx: Sender<CompileOutcome>,
    ) {
        let kernel = record.kernel.clone();
        let task = record.task.clone();
        let codegen = self.codegen.clone();
        let cache = self.cache.clone();
        let panic_handler = self.panic_handler.clone();
        let metrics = self.metrics.clone();
        let tracer = self.tracer.clone();

        self.compile_pool.execute(move || {
            let hash = fp.content_hash();
            tracer.record(flush, TraceKind::CompileStarted { hash });
            log::debug!("codegen {} for kernel `{}`", hash, kernel.name());

            let started = Instant::now();
            let generated = panic_handler
                .execute("codegen", || codegen.codegen(&kernel, &task))
                .unwrap_or_else(|report| {
                    metrics.record_panic();
                    Err(Error::Other(format!("codegen panicked: {}", report.message)))
                });
            let elapsed = started.elapsed();

            let ok = generated.is_ok();
            metrics.record_compilation(elapsed, ok);
            // recorded before the artifact is published so no dispatch can
            // appear to precede it
            tracer.record(flush, TraceKind::CompileFinished { hash, ok });

            let outcome = match generated {
                Ok(artifact) => {
                    cache.install(&fp, artifact);
                    Ok(())
                }
                Err(e) => {
                    let err = Error::Compilation {
                        kernel: kernel.name().to_string(),
                        task: fp.summary().to_string(),
                        hash,
                        message: e.to_string(),
                    };
                    cache.fail(&fp, &err.to_string());
                    Err(err)
                }
            };

            log::trace!("codegen {} done in {:?}", hash, elapsed);
            let _ = tx.send(outcome);
        });
    }

    fn join_compilations(
        &self,
        rx: &Receiver<CompileOutcome>,
        jobs: usize,
        started: Instant,
    ) -> Vec<Error> {
        let deadline = started + self.config.compile_timeout;
        let mut failures = Vec::new();

        for received in 0..jobs {
            match rx.recv_deadline(deadline) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("{}", e);
                    failures.push(e);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let waited = started.elapsed();
                    let pending = jobs - received;
                    log::error!("{} compilation(s) still running after {:?}", pending, waited);
                    self.cache
                        .fail_pending(&format!("compilation timed out after {:?}", waited));
                    failures.push(Error::CompileTimeout { pending, waited });
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.cache.fail_pending("compile worker died");
                    failures.push(Error::WorkerPanic(format!(
                        "{} compilation(s) lost with their worker",
                        jobs - received
                    )));
                    break;
                }
            }
        }

        failures
    }

    /// Hand every pending record to the launch worker, front to back.
    ///
    /// A record waits `dispatch_timeout` for its artifact, or until
    /// `compile_deadline` if that is later.
    fn submit_dispatches(
        &mut self,
        flush: u64,
        fingerprints: Vec<Fingerprint>,
        compile_deadline: Option<Instant>,
    ) -> Result<Receiver<DispatchOutcome>> {
        let (tx, rx) = unbounded();

        for (seq, fp) in fingerprints.into_iter().enumerate() {
            let Some(record) = self.pending.pop_front() else {
                break;
            };

            let cache = self.cache.clone();
            let panic_handler = self.panic_handler.clone();
            let metrics = self.metrics.clone();
            let tracer = self.tracer.clone();
            let timeout = self.config.dispatch_timeout;
            let tx = tx.clone();

            self.launch_worker.submit(move || {
                let LaunchRecord {
                    mut context, kernel, ..
                } = record;
                let hash = fp.content_hash();
                let waiting_since = Instant::now();
                let deadline = match compile_deadline {
                    Some(compile_deadline) => compile_deadline.max(waiting_since + timeout),
                    None => waiting_since + timeout,
                };

                let outcome = match cache.wait_until(&fp, deadline) {
                    Lookup::Ready(artifact) => {
                        tracer.record(flush, TraceKind::DispatchStarted { seq, hash });
                        panic_handler
                            .execute("artifact", || artifact(&mut context))
                            .map_err(|report| {
                                metrics.record_panic();
                                Error::Dispatch {
                                    kernel: kernel.name().to_string(),
                                    hash,
                                    message: format!("artifact panicked: {}", report.message),
                                }
                            })
                    }
                    Lookup::Failed(message) => Err(Error::Dispatch {
                        kernel: kernel.name().to_string(),
                        hash,
                        message: format!("artifact unavailable: {}", message),
                    }),
                    Lookup::TimedOut => Err(Error::DispatchTimeout {
                        kernel: kernel.name().to_string(),
                        hash,
                        waited: waiting_since.elapsed(),
                    }),
                    Lookup::Missing => Err(Error::Dispatch {
                        kernel: kernel.name().to_string(),
                        hash,
                        message: "no compilation was scheduled".into(),
                    }),
                };

                let ok = outcome.is_ok();
                if let Err(e) = &outcome {
                    log::warn!("skipping launch #{}: {}", seq, e);
                }
                metrics.record_dispatch(waiting_since.elapsed(), ok);
                tracer.record(flush, TraceKind::DispatchFinished { seq, hash, ok });
                let _ = tx.send((seq, outcome));
            })?;
        }

        Ok(rx)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Ready artifacts currently cached.
    pub fn cached_artifacts(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached artifact.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Event timeline of the most recent flush, if tracing is enabled.
    pub fn last_trace(&self) -> Option<FlushTrace> {
        self.tracer.last()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.compile_pool.stats()
    }

    pub fn compile_threads(&self) -> usize {
        self.compile_pool.num_threads()
    }
}

impl<K: Kernel, G: CodeGen<K>> fmt::Debug for ExecutionQueue<K, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("pending", &self.pending.len())
            .field("cache", &self.cache)
            .field("compile_pool", &self.compile_pool)
            .field("flush_count", &self.flush_count)
            .finish()
    }
}
