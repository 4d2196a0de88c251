//! Launch records: one per offloaded sub-task of a launched kernel.

use crate::ir::Kernel;
use std::fmt;
use std::sync::Arc;

/// `{context, kernel, task}` triple produced by lowering and consumed once by
/// dispatch.
pub struct LaunchRecord<K: Kernel> {
    pub context: K::Context,
    pub kernel: Arc<K>,
    pub task: Arc<K::Task>,
}

impl<K: Kernel> LaunchRecord<K> {
    pub fn new(context: K::Context, kernel: Arc<K>, task: Arc<K::Task>) -> Self {
        Self {
            context,
            kernel,
            task,
        }
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }
}

impl<K: Kernel> Clone for LaunchRecord<K> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            kernel: self.kernel.clone(),
            task: self.task.clone(),
        }
    }
}

impl<K: Kernel> fmt::Debug for LaunchRecord<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchRecord")
            .field("kernel", &self.kernel.name())
            .finish_non_exhaustive()
    }
}
