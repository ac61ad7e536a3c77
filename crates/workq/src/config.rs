//! Worker pool configuration

use crate::env::env_get;

/// Hard cap on pool size; anything larger is a configuration mistake.
pub const MAX_WORKERS: usize = 1024;

/// Configuration for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of consumer threads (defaults to CPU count).
    pub num_workers: usize,

    /// Prefix for worker thread names ("<prefix>-<id>").
    pub thread_name_prefix: String,

    /// Stack size per worker thread; `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            num_workers: num_cpus.min(MAX_WORKERS),
            thread_name_prefix: "wq-worker".to_string(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from `WQ_WORKERS` (falling back to defaults).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let workers = env_get("WQ_WORKERS", defaults.num_workers);
        defaults.num_workers(workers)
    }

    /// Set the number of worker threads.
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n.min(MAX_WORKERS);
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the per-worker stack size in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.num_workers == 0 {
            return Err("num_workers must be at least 1");
        }
        if self.num_workers > MAX_WORKERS {
            return Err("num_workers exceeds maximum");
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.num_workers >= 1);
    }

    #[test]
    fn test_builder_chain() {
        let config = PoolConfig::new()
            .num_workers(8)
            .thread_name_prefix("echo")
            .stack_size(256 * 1024);

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.thread_name_prefix, "echo");
        assert_eq!(config.stack_size, Some(256 * 1024));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_invalid() {
        let config = PoolConfig::new().num_workers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_workers_clamped_to_max() {
        let config = PoolConfig::new().num_workers(MAX_WORKERS + 1);
        assert_eq!(config.num_workers, MAX_WORKERS);
    }

    #[test]
    fn test_empty_prefix_invalid() {
        let config = PoolConfig::new().thread_name_prefix("");
        assert!(config.validate().is_err());
    }
}
