//! Capabilities the scheduler consumes from the surrounding compiler.
//!
//! Lowering, code generation and batch optimization are not implemented
//! here. A runtime plugs them in through [`Kernel`], [`CodeGen`] and
//! [`BatchOptimizer`].

use crate::error::Result;
use crate::record::LaunchRecord;
use std::collections::VecDeque;
use std::sync::Arc;

/// A compiled native callable. Invoked with a mutable copy of the launch
/// context.
pub type Artifact<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

/// One independently compilable fragment of a lowered kernel.
pub trait SubTask: Send + Sync + 'static {
    /// Canonical textual form of the program representation. Identical
    /// programs must print identically.
    fn canonical_text(&self) -> String;
}

/// Top-level shape of a lowered kernel.
#[derive(Debug)]
pub enum IrNode<T> {
    /// An offloaded sub-task.
    Offload(Arc<T>),
    /// A statement block.
    Block(Vec<IrNode<T>>),
    /// Anything else the lowering pass may produce, by kind name.
    Other(String),
}

impl<T> IrNode<T> {
    pub fn kind(&self) -> &str {
        match self {
            IrNode::Offload(_) => "offload",
            IrNode::Block(_) => "block",
            IrNode::Other(kind) => kind,
        }
    }

    /// Flatten a top-level block of offloads into its sub-tasks, in order.
    ///
    /// Any other shape is a lowering defect and is reported, never skipped.
    pub fn into_offloads(self) -> std::result::Result<Vec<Arc<T>>, String> {
        let statements = match self {
            IrNode::Block(statements) => statements,
            other => return Err(format!("top-level node is `{}`, expected a block", other.kind())),
        };

        statements
            .into_iter()
            .enumerate()
            .map(|(i, stmt)| match stmt {
                IrNode::Offload(task) => Ok(task),
                other => Err(format!("statement {} is `{}`, expected an offload", i, other.kind())),
            })
            .collect()
    }
}

/// A kernel the caller wants executed.
pub trait Kernel: Send + Sync + 'static {
    type Task: SubTask;
    type Context: Clone + Send + 'static;

    fn name(&self) -> &str;

    fn is_lowered(&self) -> bool;

    /// Lower the kernel into offload-sized sub-tasks.
    fn lower(&self) -> Result<()>;

    /// The lowered program.
    fn ir(&self) -> IrNode<Self::Task>;

    /// Execution context captured by each launch record.
    fn context(&self) -> Self::Context;
}

/// Turns a sub-task into a native callable.
pub trait CodeGen<K: Kernel>: Send + Sync + 'static {
    fn codegen(&self, kernel: &K, task: &K::Task) -> Result<Artifact<K::Context>>;
}

/// Batch-level rewrite over the pending launch records, run once per launch.
pub trait BatchOptimizer<K: Kernel>: Send + Sync {
    fn optimize(&self, batch: &mut VecDeque<LaunchRecord<K>>);
}

/// Leaves the batch untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOptimizer;

impl<K: Kernel> BatchOptimizer<K> for NoopOptimizer {
    fn optimize(&self, _batch: &mut VecDeque<LaunchRecord<K>>) {}
}
