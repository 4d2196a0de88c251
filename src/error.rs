use crate::hash::ContentHash;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("kernel `{kernel}` lowered to malformed IR: {reason}")]
    MalformedIr { kernel: String, reason: String },

    #[error("lowering kernel `{kernel}` failed: {message}")]
    Lowering { kernel: String, message: String },

    #[error("codegen failed for kernel `{kernel}` task `{task}` ({hash}): {message}")]
    Compilation {
        kernel: String,
        task: String,
        hash: ContentHash,
        message: String,
    },

    #[error("{pending} compilation(s) still running after {waited:?}")]
    CompileTimeout { pending: usize, waited: Duration },

    #[error("artifact {hash} for kernel `{kernel}` not available after {waited:?}")]
    DispatchTimeout {
        kernel: String,
        hash: ContentHash,
        waited: Duration,
    },

    #[error("dispatch of kernel `{kernel}` ({hash}) failed: {message}")]
    Dispatch {
        kernel: String,
        hash: ContentHash,
        message: String,
    },

    #[error("{failed} of {total} launches failed; first: {first}")]
    FlushFailed {
        failed: usize,
        total: usize,
        first: Box<Error>,
    },

    #[error("worker panic: {0}")]
    WorkerPanic(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn malformed_ir<K: Into<String>, R: Into<String>>(kernel: K, reason: R) -> Self {
        Error::MalformedIr {
            kernel: kernel.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error was produced by a failing or hung code generator.
    pub fn is_compilation(&self) -> bool {
        match self {
            Error::Compilation { .. } | Error::CompileTimeout { .. } => true,
            Error::FlushFailed { first, .. } => first.is_compilation(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
