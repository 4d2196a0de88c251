pub use crate::config::{CachePolicy, Config, ConfigBuilder, FailurePolicy};
pub use crate::engine::AsyncEngine;
pub use crate::error::{Error, Result};
pub use crate::executor::PanicStrategy;
pub use crate::hash::{ContentHash, Fingerprint};
pub use crate::ir::{Artifact, BatchOptimizer, CodeGen, IrNode, Kernel, NoopOptimizer, SubTask};
pub use crate::queue::{ExecutionQueue, FlushReport};
pub use crate::record::LaunchRecord;

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};

pub use crate::telemetry::FlushTrace;
