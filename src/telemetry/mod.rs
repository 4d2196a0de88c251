//! Queue observability.
//!
//! Counters, latency histograms and a per-flush event timeline.

#[cfg(feature = "telemetry")]
pub mod metrics;

pub mod trace;

#[cfg(feature = "telemetry")]
pub use metrics::{Metrics, MetricsSnapshot};

pub use trace::{FlushTrace, FlushTracer, TraceEvent, TraceKind};

// Stub implementations when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use std::time::Duration;

    #[derive(Debug, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self { Self }
        pub fn record_flush(&self) {}
        pub fn record_compilation(&self, _: Duration, _: bool) {}
        pub fn record_dispatch(&self, _: Duration, _: bool) {}
        pub fn record_cache_hit(&self) {}
        pub fn record_dedup_hit(&self) {}
        pub fn record_hash_collision(&self) {}
        pub fn record_panic(&self) {}
        pub fn snapshot(&self) -> MetricsSnapshot { MetricsSnapshot::default() }
        pub fn reset(&self) {}
    }

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
}

#[cfg(not(feature = "telemetry"))]
pub use metrics::{Metrics, MetricsSnapshot};
