use crate::error::{Error, Result};
use crate::executor::PanicStrategy;
use std::time::Duration;

/// How long compiled artifacts live in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Cleared at the end of every flush. No reuse across launches.
    PerFlush,
    /// Kept across flushes; least recently used entries beyond `max_entries`
    /// are evicted when a flush completes.
    Persistent { max_entries: usize },
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::PerFlush
    }
}

/// What a flush does when a sub-task fails to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Discard the whole flush before anything is dispatched.
    AbortFlush,
    /// Skip only the records that depend on the failed artifact.
    SkipDependents,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::SkipDependents
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub compile_threads: Option<usize>,
    pub cache_policy: CachePolicy,
    pub failure_policy: FailurePolicy,
    pub pipelined: bool,
    pub compile_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub panic_strategy: PanicStrategy,

    #[cfg(feature = "telemetry")]
    pub enable_telemetry: bool,

    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compile_threads: None,
            cache_policy: CachePolicy::default(),
            failure_policy: FailurePolicy::default(),
            pipelined: false,
            compile_timeout: Duration::from_secs(300),
            dispatch_timeout: Duration::from_secs(60),
            panic_strategy: PanicStrategy::default(),

            #[cfg(feature = "telemetry")]
            enable_telemetry: true,

            stack_size: Some(8 * 1024 * 1024),
            thread_name_prefix: "offload".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.compile_threads {
            if n == 0 {
                return Err(Error::config("compile_threads must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("compile_threads too large (max 1024)"));
            }
        }

        if let CachePolicy::Persistent { max_entries } = self.cache_policy {
            if max_entries == 0 {
                return Err(Error::config("persistent cache needs max_entries > 0"));
            }
        }

        if self.compile_timeout.is_zero() {
            return Err(Error::config("compile_timeout must be > 0"));
        }
        if self.dispatch_timeout.is_zero() {
            return Err(Error::config("dispatch_timeout must be > 0"));
        }

        if self.pipelined && self.failure_policy == FailurePolicy::AbortFlush {
            return Err(Error::config(
                "pipelined dispatch cannot abort a flush that is already executing",
            ));
        }

        Ok(())
    }

    /// Compilation pool size, defaulting to the hardware concurrency.
    pub fn compile_threads(&self) -> usize {
        self.compile_threads.unwrap_or_else(num_cpus::get)
    }

    pub(crate) fn telemetry_enabled(&self) -> bool {
        #[cfg(feature = "telemetry")]
        return self.enable_telemetry;

        #[cfg(not(feature = "telemetry"))]
        false
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn compile_threads(mut self, n: usize) -> Self {
        self.config.compile_threads = Some(n);
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn pipelined(mut self, pipelined: bool) -> Self {
        self.config.pipelined = pipelined;
        self
    }

    pub fn compile_timeout(mut self, timeout: Duration) -> Self {
        self.config.compile_timeout = timeout;
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch_timeout = timeout;
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    #[cfg(feature = "telemetry")]
    pub fn enable_telemetry(mut self, enable: bool) -> Self {
        self.config.enable_telemetry = enable;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
