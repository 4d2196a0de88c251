//! Per-flush event timeline for ordering audits.

use crate::hash::ContentHash;
use parking_lot::{Mutex, RwLock};
use std::time::Instant;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    CompileStarted { hash: ContentHash },
    CompileFinished { hash: ContentHash, ok: bool },
    DispatchStarted { seq: usize, hash: ContentHash },
    DispatchFinished { seq: usize, hash: ContentHash, ok: bool },
}

/// An event with its timestamp
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub at: Instant,
    pub kind: TraceKind,
}

/// Timeline of one flush.
#[derive(Debug, Clone)]
pub struct FlushTrace {
    pub flush: u64,
    pub started: Instant,
    pub finished: Option<Instant>,
    pub events: Vec<TraceEvent>,
}

impl FlushTrace {
    /// Sequence numbers in the order their dispatch started.
    pub fn dispatch_order(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                TraceKind::DispatchStarted { seq, .. } => Some(seq),
                _ => None,
            })
            .collect()
    }

    pub fn compiled_at(&self, hash: ContentHash) -> Option<Instant> {
        self.events.iter().find_map(|e| match e.kind {
            TraceKind::CompileFinished { hash: h, ok: true } if h == hash => Some(e.at),
            _ => None,
        })
    }

    pub fn compilations(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::CompileStarted { .. }))
            .count()
    }

    /// Dispatches that started before their artifact compiled in this
    /// flush. Artifacts reused from earlier flushes have no compile event
    /// and are not reported.
    pub fn premature_dispatches(&self) -> Vec<usize> {
        let mut compiled: Vec<(ContentHash, Instant)> = Vec::new();
        let mut scheduled: Vec<ContentHash> = Vec::new();
        let mut premature = Vec::new();

        for event in &self.events {
            match event.kind {
                TraceKind::CompileStarted { hash } => scheduled.push(hash),
                TraceKind::CompileFinished { hash, ok: true } => compiled.push((hash, event.at)),
                TraceKind::DispatchStarted { seq, hash } if scheduled.contains(&hash) => {
                    let ready = compiled.iter().any(|(h, at)| *h == hash && *at <= event.at);
                    if !ready {
                        premature.push(seq);
                    }
                }
                _ => {}
            }
        }

        premature
    }
}

/// Collects the timeline of the running flush and keeps the last finished one.
#[derive(Debug)]
pub struct FlushTracer {
    enabled: bool,
    current: Mutex<Option<FlushTrace>>,
    last: RwLock<Option<FlushTrace>>,
}

impl FlushTracer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            current: Mutex::new(None),
            last: RwLock::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn begin(&self, flush: u64) {
        if !self.enabled {
            return;
        }
        *self.current.lock() = Some(FlushTrace {
            flush,
            started: Instant::now(),
            finished: None,
            events: Vec::new(),
        });
    }

    /// Append an event to the timeline of `flush`. Events from a flush that
    /// already finished, such as a compile job outliving its timeout, are
    /// dropped.
    pub fn record(&self, flush: u64, kind: TraceKind) {
        if !self.enabled {
            return;
        }
        // timestamp under the lock so event order matches time order
        if let Some(trace) = self.current.lock().as_mut().filter(|t| t.flush == flush) {
            trace.events.push(TraceEvent {
                at: Instant::now(),
                kind,
            });
        }
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        if let Some(mut trace) = self.current.lock().take() {
            trace.finished = Some(Instant::now());
            *self.last.write() = Some(trace);
        }
    }

    pub fn last(&self) -> Option<FlushTrace> {
        self.last.read().clone()
    }
}

impl Default for FlushTracer {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_lifecycle() {
        let tracer = FlushTracer::new(true);
        tracer.begin(1);
        tracer.record(1, TraceKind::CompileStarted { hash: ContentHash(1) });
        tracer.record(1, TraceKind::CompileFinished { hash: ContentHash(1), ok: true });
        tracer.record(1, TraceKind::DispatchStarted { seq: 0, hash: ContentHash(1) });
        assert!(tracer.last().is_none());
        tracer.finish();

        let trace = tracer.last().unwrap();
        assert_eq!(trace.flush, 1);
        assert_eq!(trace.events.len(), 3);
        assert_eq!(trace.compilations(), 1);
        assert_eq!(trace.dispatch_order(), vec![0]);
        assert!(trace.premature_dispatches().is_empty());
        assert!(trace.compiled_at(ContentHash(1)).is_some());
    }

    #[test]
    fn test_detects_premature_dispatch() {
        let tracer = FlushTracer::new(true);
        tracer.begin(1);
        tracer.record(1, TraceKind::CompileStarted { hash: ContentHash(9) });
        tracer.record(1, TraceKind::DispatchStarted { seq: 3, hash: ContentHash(9) });
        tracer.record(1, TraceKind::CompileFinished { hash: ContentHash(9), ok: true });
        tracer.finish();

        assert_eq!(tracer.last().unwrap().premature_dispatches(), vec![3]);
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let tracer = FlushTracer::new(true);
        tracer.begin(1);
        tracer.finish();

        tracer.begin(2);
        tracer.record(1, TraceKind::CompileStarted { hash: ContentHash(4) });
        tracer.record(1, TraceKind::CompileFinished { hash: ContentHash(4), ok: true });
        tracer.record(2, TraceKind::CompileStarted { hash: ContentHash(5) });
        tracer.finish();

        let trace = tracer.last().unwrap();
        assert_eq!(trace.flush, 2);
        assert_eq!(trace.events.len(), 1);
        assert_eq!(trace.compilations(), 1);
        assert!(trace.compiled_at(ContentHash(4)).is_none());
    }

    #[test]
    fn test_disabled_tracer_records_nothing() {
        let tracer = FlushTracer::new(false);
        tracer.begin(1);
        tracer.record(1, TraceKind::CompileStarted { hash: ContentHash(1) });
        tracer.finish();
        assert!(tracer.last().is_none());
    }
}
