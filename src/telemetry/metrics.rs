//! Counters and latency histograms for the execution queue.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Queue metrics collector
#[derive(Debug)]
pub struct Metrics {
    flushes: AtomicU64,
    records_dispatched: AtomicU64,
    dispatch_failures: AtomicU64,

    compilations: AtomicU64,
    compile_failures: AtomicU64,
    cache_hits: AtomicU64,
    dedup_hits: AtomicU64,
    hash_collisions: AtomicU64,
    panics: AtomicU64,

    // nanoseconds, 3 significant figures, max 1 hour
    compile_latency: Mutex<Histogram<u64>>,
    dispatch_wait: Mutex<Histogram<u64>>,

    start_time: Instant,
}

fn histogram() -> Histogram<u64> {
    Histogram::new_with_max(3_600_000_000_000, 3).expect("Failed to create histogram")
}

fn nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            flushes: AtomicU64::new(0),
            records_dispatched: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
            compile_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
            hash_collisions: AtomicU64::new(0),
            panics: AtomicU64::new(0),
            compile_latency: Mutex::new(histogram()),
            dispatch_wait: Mutex::new(histogram()),
            start_time: Instant::now(),
        }
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compilation(&self, elapsed: Duration, ok: bool) {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.compile_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.compile_latency.lock().saturating_record(nanos(elapsed));
    }

    pub fn record_dispatch(&self, waited: Duration, ok: bool) {
        if ok {
            self.records_dispatched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.dispatch_wait.lock().saturating_record(nanos(waited));
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hash_collision(&self) {
        self.hash_collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let compile = self.compile_latency.lock();
        let wait = self.dispatch_wait.lock();

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            flushes: self.flushes.load(Ordering::Relaxed),
            records_dispatched: self.records_dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
            hash_collisions: self.hash_collisions.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            avg_compile_ns: if compile.len() > 0 { compile.mean() as u64 } else { 0 },
            p99_compile_ns: compile.value_at_quantile(0.99),
            max_compile_ns: compile.max(),
            p99_dispatch_wait_ns: wait.value_at_quantile(0.99),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.flushes,
            &self.records_dispatched,
            &self.dispatch_failures,
            &self.compilations,
            &self.compile_failures,
            &self.cache_hits,
            &self.dedup_hits,
            &self.hash_collisions,
            &self.panics,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.compile_latency.lock().reset();
        self.dispatch_wait.lock().reset();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub flushes: u64,
    pub records_dispatched: u64,
    pub dispatch_failures: u64,
    pub compilations: u64,
    pub compile_failures: u64,
    pub cache_hits: u64,
    pub dedup_hits: u64,
    pub hash_collisions: u64,
    pub panics: u64,
    pub avg_compile_ns: u64,
    pub p99_compile_ns: u64,
    pub max_compile_ns: u64,
    pub p99_dispatch_wait_ns: u64,
}

impl MetricsSnapshot {
    /// Fraction of records that did not need their own compilation.
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.compilations + self.cache_hits + self.dedup_hits;
        if total == 0 {
            return 0.0;
        }
        (self.cache_hits + self.dedup_hits) as f64 / total as f64
    }
}
