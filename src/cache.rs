//! Compiled artifact cache shared by compile workers and the launch worker.
//!
//! Every entry starts `Pending` when a flush schedules its compilation and
//! moves exactly once to `Ready` or `Failed`. Waiters block on a condition
//! variable that is notified on each such transition.

use crate::config::CachePolicy;
use crate::hash::Fingerprint;
use crate::ir::Artifact;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Slot<C> {
    Pending,
    Ready(Artifact<C>),
    Failed(Arc<str>),
}

struct Entry<C> {
    slot: Slot<C>,
    scheduled_in: u64,
    last_used: u64,
}

/// Result of asking the cache for a fingerprint at the start of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// First sighting; the caller must compile it.
    Scheduled,
    /// Already scheduled earlier in this flush.
    InFlight,
    /// Ready artifact compiled by a previous flush.
    Cached,
}

/// Outcome of waiting for an artifact.
pub enum Lookup<C> {
    Ready(Artifact<C>),
    Failed(Arc<str>),
    TimedOut,
    Missing,
}

impl<C> fmt::Debug for Lookup<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Ready(_) => f.write_str("Ready"),
            Lookup::Failed(message) => f.debug_tuple("Failed").field(message).finish(),
            Lookup::TimedOut => f.write_str("TimedOut"),
            Lookup::Missing => f.write_str("Missing"),
        }
    }
}

pub struct ArtifactCache<C> {
    entries: Mutex<HashMap<Fingerprint, Entry<C>>>,
    settled: Condvar,
}

impl<C> ArtifactCache<C> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            settled: Condvar::new(),
        }
    }

    /// Look `fp` up and, if absent, mark it `Pending` for this flush.
    pub fn reserve(&self, fp: &Fingerprint, flush: u64) -> Reservation {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(fp) {
            entry.last_used = flush;
            return match entry.slot {
                Slot::Ready(_) if entry.scheduled_in != flush => Reservation::Cached,
                _ => Reservation::InFlight,
            };
        }

        entries.insert(
            fp.clone(),
            Entry {
                slot: Slot::Pending,
                scheduled_in: flush,
                last_used: flush,
            },
        );
        Reservation::Scheduled
    }

    /// Publish a compiled artifact. Returns false if the entry already
    /// settled or was dropped, in which case the artifact is discarded.
    pub fn install(&self, fp: &Fingerprint, artifact: Artifact<C>) -> bool {
        self.settle(fp, Slot::Ready(artifact))
    }

    /// Record that compilation of `fp` failed.
    pub fn fail(&self, fp: &Fingerprint, message: &str) -> bool {
        self.settle(fp, Slot::Failed(Arc::from(message)))
    }

    fn settle(&self, fp: &Fingerprint, slot: Slot<C>) -> bool {
        let installed = {
            let mut entries = self.entries.lock();
            match entries.get_mut(fp) {
                Some(entry) if matches!(entry.slot, Slot::Pending) => {
                    entry.slot = slot;
                    true
                }
                _ => false,
            }
        };

        if installed {
            self.settled.notify_all();
        }
        installed
    }

    /// Fail every entry still pending. Used when compilation times out.
    pub fn fail_pending(&self, message: &str) -> usize {
        let message: Arc<str> = Arc::from(message);
        let mut count = 0;
        {
            let mut entries = self.entries.lock();
            for entry in entries.values_mut() {
                if matches!(entry.slot, Slot::Pending) {
                    entry.slot = Slot::Failed(message.clone());
                    count += 1;
                }
            }
        }
        if count > 0 {
            self.settled.notify_all();
        }
        count
    }

    /// Block until `fp` settles or `timeout` elapses.
    pub fn wait(&self, fp: &Fingerprint, timeout: Duration) -> Lookup<C> {
        self.wait_until(fp, Instant::now() + timeout)
    }

    /// Block until `fp` settles or `deadline` passes.
    pub fn wait_until(&self, fp: &Fingerprint, deadline: Instant) -> Lookup<C> {
        let mut entries = self.entries.lock();
        let mut timed_out = false;

        loop {
            match entries.get(fp).map(|e| &e.slot) {
                None => return Lookup::Missing,
                Some(Slot::Ready(artifact)) => return Lookup::Ready(artifact.clone()),
                Some(Slot::Failed(message)) => return Lookup::Failed(message.clone()),
                Some(Slot::Pending) if timed_out => return Lookup::TimedOut,
                Some(Slot::Pending) => {}
            }

            timed_out = self.settled.wait_until(&mut entries, deadline).timed_out();
        }
    }

    /// Apply the cache policy once a flush has finished. Failed and stale
    /// pending entries are always dropped. Returns the number of entries
    /// removed.
    pub fn end_flush(&self, policy: CachePolicy) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();

        match policy {
            CachePolicy::PerFlush => entries.clear(),
            CachePolicy::Persistent { max_entries } => {
                entries.retain(|_, e| matches!(e.slot, Slot::Ready(_)));

                if entries.len() > max_entries {
                    let mut by_age: Vec<(u64, Fingerprint)> = entries
                        .iter()
                        .map(|(fp, e)| (e.last_used, fp.clone()))
                        .collect();
                    by_age.sort_by_key(|(last_used, _)| *last_used);

                    let excess = entries.len() - max_entries;
                    for (_, fp) in by_age.into_iter().take(excess) {
                        entries.remove(&fp);
                    }
                }
            }
        }

        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of ready artifacts.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| matches!(e.slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        matches!(self.entries.lock().get(fp).map(|e| &e.slot), Some(Slot::Ready(_)))
    }
}

impl<C> Default for ArtifactCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ArtifactCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}
