//! Worker-pool configuration for per-site parallel dispatch
//!
//! The engine never reads core counts from ambient environment state; the
//! worker budget is an explicit value handed to [`IndexEngine`]. Pools are
//! built locally per computation rather than installed globally, so two
//! engines with different budgets never interfere.
//!
//! [`IndexEngine`]: crate::engine::IndexEngine

use crate::errors::{AridityError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Explicit worker count for site-parallel computations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerBudget {
    pub workers: usize,
}

impl WorkerBudget {
    /// A single worker; the conservative default.
    pub fn serial() -> Self {
        Self { workers: 1 }
    }

    /// A specific number of workers.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// One worker per available CPU core.
    pub fn all_cores() -> Self {
        Self {
            workers: num_cpus::get(),
        }
    }

    /// Build a local rayon pool sized to this budget.
    ///
    /// # Errors
    ///
    /// Returns `ThreadPool` if the pool cannot be constructed.
    pub fn build_pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| {
                AridityError::ThreadPool(format!(
                    "Failed to initialize pool with {} workers: {e}",
                    self.workers
                ))
            })
    }
}

impl Default for WorkerBudget {
    fn default() -> Self {
        Self::serial()
    }
}
