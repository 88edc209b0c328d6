//! Engine configuration
//!
//! Defaults for job parameters and fork/join sizing, overridable through
//! `BATCHLINE_*` environment variables (a `.env` file is honoured).

use serde::{Deserialize, Serialize};

use crate::error::{BatchlineError, Result};

// ============================================================================
// Engine Configuration Constants
// ============================================================================

/// Default number of records written per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Default error threshold. `u64::MAX` means "never abort".
pub const DEFAULT_ERROR_THRESHOLD: u64 = u64::MAX;

/// Default number of fork/join worker pipelines.
pub const DEFAULT_WORKERS: usize = 2;

/// Default capacity of each fork/join queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Records per batch handed to a writer
    pub batch_size: usize,
    /// Tolerated per-record errors before a job aborts
    pub error_threshold: u64,
    /// Publish report snapshots through a job monitor
    pub monitoring: bool,
    /// Number of worker pipelines in a fork/join topology
    pub workers: usize,
    /// Capacity of worker and aggregation queues
    pub queue_capacity: usize,
    /// Size of the task pool running jobs. Must be at least `workers + 2`
    /// for a fork/join topology (master, workers, join).
    pub pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            monitoring: false,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pool_size: DEFAULT_WORKERS + 2,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment and defaults
    ///
    /// Environment variables:
    /// - `BATCHLINE_BATCH_SIZE`
    /// - `BATCHLINE_ERROR_THRESHOLD`
    /// - `BATCHLINE_MONITORING` (true/false)
    /// - `BATCHLINE_WORKERS`
    /// - `BATCHLINE_QUEUE_CAPACITY`
    /// - `BATCHLINE_POOL_SIZE` (defaults to workers + 2)
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let workers = env_parse("BATCHLINE_WORKERS")?.unwrap_or(DEFAULT_WORKERS);

        let config = EngineConfig {
            batch_size: env_parse("BATCHLINE_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
            error_threshold: env_parse("BATCHLINE_ERROR_THRESHOLD")?
                .unwrap_or(DEFAULT_ERROR_THRESHOLD),
            monitoring: env_parse("BATCHLINE_MONITORING")?.unwrap_or(false),
            workers,
            queue_capacity: env_parse("BATCHLINE_QUEUE_CAPACITY")?
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            pool_size: env_parse("BATCHLINE_POOL_SIZE")?.unwrap_or(workers.saturating_add(2)),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BatchlineError::Config("batch_size must be >= 1".to_string()));
        }

        if self.error_threshold == 0 {
            return Err(BatchlineError::Config("error_threshold must be >= 1".to_string()));
        }

        if self.workers == 0 {
            return Err(BatchlineError::Config("workers must be >= 1".to_string()));
        }

        if self.queue_capacity == 0 {
            return Err(BatchlineError::Config("queue_capacity must be >= 1".to_string()));
        }

        if self.pool_size == 0 {
            return Err(BatchlineError::Config("pool_size must be >= 1".to_string()));
        }

        if self.is_pool_undersized() {
            tracing::warn!(
                pool_size = self.pool_size,
                required = self.min_fork_join_pool_size(),
                "pool_size is below workers + 2; fork/join topologies may deadlock"
            );
        }

        Ok(())
    }

    /// Pool slots a fork/join topology needs: master, workers, join
    pub fn min_fork_join_pool_size(&self) -> usize {
        self.workers.saturating_add(2)
    }

    /// Undersized pools are allowed, but a fork/join run on one can deadlock
    pub fn is_pool_undersized(&self) -> bool {
        self.pool_size < self.min_fork_join_pool_size()
    }
}

/// Parse an optional environment variable, reporting malformed values
/// instead of silently falling back to the default.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BatchlineError::Config(format!("invalid value for {}: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
