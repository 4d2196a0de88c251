//! offload-rs - asynchronous JIT compilation and ordered dispatch
//!
//! A scheduler for compute-kernel runtimes. A launched kernel is lowered into
//! offloaded sub-tasks; the sub-tasks are deduplicated by content, compiled in
//! parallel on a work-stealing pool and executed on a single launch thread
//! in the order they were submitted.
//!
//! # Quick Start
//!
//! ```no_run
//! use offload_rs::prelude::*;
//! use std::sync::Arc;
//!
//! struct Offload(String);
//!
//! impl SubTask for Offload {
//!     fn canonical_text(&self) -> String {
//!         self.0.clone()
//!     }
//! }
//!
//! struct Saxpy {
//!     offloads: Vec<Arc<Offload>>,
//! }
//!
//! impl Kernel for Saxpy {
//!     type Task = Offload;
//!     type Context = Vec<f32>;
//!
//!     fn name(&self) -> &str { "saxpy" }
//!     fn is_lowered(&self) -> bool { true }
//!     fn lower(&self) -> Result<()> { Ok(()) }
//!     fn ir(&self) -> IrNode<Offload> {
//!         IrNode::Block(self.offloads.iter().cloned().map(IrNode::Offload).collect())
//!     }
//!     fn context(&self) -> Vec<f32> { vec![1.0; 16] }
//! }
//!
//! struct Interpreter;
//!
//! impl CodeGen<Saxpy> for Interpreter {
//!     fn codegen(&self, _kernel: &Saxpy, _task: &Offload) -> Result<Artifact<Vec<f32>>> {
//!         Ok(Arc::new(|xs: &mut Vec<f32>| xs.iter_mut().for_each(|x| *x *= 2.0)))
//!     }
//! }
//!
//! let mut engine = AsyncEngine::new(Config::default(), Interpreter).unwrap();
//! let kernel = Arc::new(Saxpy {
//!     offloads: vec![Arc::new(Offload("range_for 0..16".into()))],
//! });
//! let report = engine.launch(&kernel).unwrap();
//! println!("compiled {} of {} offloads", report.compiled, report.records);
//! ```
//!
//! # Guarantees
//!
//! - **Deduplication**: each distinct sub-task is compiled at most once per
//!   flush; equal content hashes with different canonical text are not
//!   treated as equal.
//! - **Ordering**: records execute in enqueue order, regardless of the order
//!   in which their compilations finish.
//! - **Readiness**: a record never runs before its artifact is published.
//! - **Bounded waits**: compilation and dispatch waits time out with typed
//!   errors instead of hanging.

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hash;
pub mod ir;
pub mod prelude;
pub mod queue;
pub mod record;
pub mod telemetry;
pub mod util;

// Re-export key types at crate root
pub use config::{CachePolicy, Config, ConfigBuilder, FailurePolicy};
pub use engine::AsyncEngine;
pub use error::{Error, Result};
pub use hash::{rolling_hash, ContentHash, Fingerprint};
pub use ir::{Artifact, BatchOptimizer, CodeGen, IrNode, Kernel, NoopOptimizer, SubTask};
pub use queue::{ExecutionQueue, FlushReport};
pub use record::LaunchRecord;
