//! Thread infrastructure for the execution queue.
//!
//! A work-stealing pool for compilation jobs and a single launch thread
//! for ordered dispatch.

pub mod compile_pool;
mod job;
pub mod launch;
pub mod panic_handler;
mod worker;

pub use compile_pool::{CompilePool, PoolStats};
pub use launch::LaunchWorker;
pub use panic_handler::{PanicHandler, PanicReport, PanicStrategy};
