//! Caller-facing entry point: kernel in, executed batch out.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{BatchOptimizer, CodeGen, Kernel, NoopOptimizer};
use crate::queue::{ExecutionQueue, FlushReport};
use crate::record::LaunchRecord;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Lowers kernels into launch records and pushes them through an
/// [`ExecutionQueue`].
pub struct AsyncEngine<K: Kernel, G: CodeGen<K>, O: BatchOptimizer<K> = NoopOptimizer> {
    pending: VecDeque<LaunchRecord<K>>,
    queue: ExecutionQueue<K, G>,
    optimizer: O,
}

impl<K: Kernel, G: CodeGen<K>> AsyncEngine<K, G, NoopOptimizer> {
    pub fn new(config: Config, codegen: G) -> Result<Self> {
        Self::with_optimizer(config, codegen, NoopOptimizer)
    }
}

impl<K: Kernel, G: CodeGen<K>, O: BatchOptimizer<K>> AsyncEngine<K, G, O> {
    pub fn with_optimizer(config: Config, codegen: G, optimizer: O) -> Result<Self> {
        Ok(Self {
            pending: VecDeque::new(),
            queue: ExecutionQueue::new(config, codegen)?,
            optimizer,
        })
    }

    /// Lower `kernel`, optimize the resulting batch and run it to completion.
    ///
    /// The lowered program must be a flat block of offloads. Anything else is
    /// rejected before a single record is queued.
    pub fn launch(&mut self, kernel: &Arc<K>) -> Result<FlushReport> {
        if !kernel.is_lowered() {
            kernel.lower().map_err(|e| match e {
                e @ Error::MalformedIr { .. } => e,
                other => Error::Lowering {
                    kernel: kernel.name().to_string(),
                    message: other.to_string(),
                },
            })?;
        }

        let offloads = kernel
            .ir()
            .into_offloads()
            .map_err(|reason| Error::malformed_ir(kernel.name(), reason))?;

        log::debug!("kernel `{}` lowered into {} offloads", kernel.name(), offloads.len());

        for task in offloads {
            self.pending
                .push_back(LaunchRecord::new(kernel.context(), kernel.clone(), task));
        }

        self.optimizer.optimize(&mut self.pending);
        self.synchronize()
    }

    /// Drain the pending batch into the queue, in order, and flush it.
    pub fn synchronize(&mut self) -> Result<FlushReport> {
        while let Some(record) = self.pending.pop_front() {
            self.queue.enqueue(record);
        }
        self.queue.synchronize()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queue(&self) -> &ExecutionQueue<K, G> {
        &self.queue
    }

    pub fn config(&self) -> &Config {
        self.queue.config()
    }
}

impl<K: Kernel, G: CodeGen<K>, O: BatchOptimizer<K>> fmt::Debug for AsyncEngine<K, G, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEngine")
            .field("pending", &self.pending.len())
            .field("queue", &self.queue)
            .finish()
    }
}
