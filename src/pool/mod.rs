//! # Worker Pool Module
//!
//! Pools own idle [`Worker`]s and hand them out one exchange at a time.
//!
//! ## Strategies
//!
//! - [`FixedWorkerPool`]: exactly N workers for the pool's lifetime. When all
//!   are checked out, `take()` blocks until one is released, which makes the
//!   pool the admission-control point for the whole system.
//! - [`DynamicWorkerPool`]: keeps N idle workers warm, spawns a fresh worker
//!   whenever none is idle and terminates surplus workers on release.
//!
//! ## Ownership
//!
//! Every worker a pool spawns is enrolled in the [`membership`] side table.
//! `release()` consults it and hands foreign workers straight back to the
//! caller inside [`ForeignWorker`], leaving the pool untouched.
//!
//! ## Configuration
//!
//! See [`PoolConfig`] for the `KEIRO_*` environment variables.

mod config;
mod dynamic;
mod fixed;
pub mod membership;
mod metrics;

use std::fmt;
use std::sync::Arc;

use crate::error::PoolError;
use crate::ids::PoolId;
use crate::registry::{HandlerRegistry, WorkerRouterData};
use crate::worker::Worker;

pub use config::{parse_stack_size, PoolConfig, PoolStrategy, WaiterOrder};
pub use dynamic::DynamicWorkerPool;
pub use fixed::FixedWorkerPool;
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};

/// A worker released to a pool that does not own it. Carries the worker back
/// so the caller can release it to the right pool.
pub struct ForeignWorker(pub Worker);

impl fmt::Debug for ForeignWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignWorker").field(&self.0.id()).finish()
    }
}

impl fmt::Display for ForeignWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} does not belong to this pool", self.0.id())
    }
}

impl std::error::Error for ForeignWorker {}

/// Shared contract of the pool strategies.
pub trait WorkerPool: Send + Sync {
    fn id(&self) -> PoolId;

    /// Check out a worker for one exchange.
    fn take(&self) -> Result<Worker, PoolError>;

    /// Give a worker back after its exchange reached DONE.
    fn release(&self, worker: Worker) -> Result<(), ForeignWorker>;

    /// Terminate a worker whose exchange was aborted. A fixed pool replaces it.
    fn retire(&self, worker: Worker);

    fn metrics(&self) -> PoolMetricsSnapshot;
}

/// Build the pool described by `config`.
pub fn build_pool(
    config: &PoolConfig,
    router: &WorkerRouterData,
    registry: &HandlerRegistry,
) -> Result<Arc<dyn WorkerPool>, PoolError> {
    let pool: Arc<dyn WorkerPool> = match config.strategy {
        PoolStrategy::Fixed => Arc::new(FixedWorkerPool::from_config(config, router, registry)?),
        PoolStrategy::Dynamic => {
            Arc::new(DynamicWorkerPool::from_config(config, router, registry)?)
        }
    };
    Ok(pool)
}

fn check_worker_count(workers: usize) -> Result<(), PoolError> {
    if workers == 0 {
        return Err(PoolError::Configuration {
            reason: "worker count must be at least 1".to_string(),
        });
    }
    Ok(())
}
