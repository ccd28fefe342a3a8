use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{check_worker_count, membership, ForeignWorker, PoolConfig, WorkerPool};
use super::{PoolMetrics, PoolMetricsSnapshot};
use crate::error::PoolError;
use crate::ids::PoolId;
use crate::registry::{HandlerRegistry, ResolvedRouter, WorkerRouterData};
use crate::worker::{Worker, WorkerOptions};

/// A pool that never makes callers wait.
///
/// Starts with `min_idle` workers. `take()` reuses an idle worker or spawns a
/// new one; `release()` keeps the worker only while fewer than `min_idle` are
/// idle and otherwise terminates it.
///
/// `take()` never waits for another caller, but a spawn waits for the new
/// worker's startup handshake, so a cold `take()` costs one worker start.
pub struct DynamicWorkerPool {
    id: PoolId,
    min_idle: usize,
    router: Arc<ResolvedRouter>,
    options: WorkerOptions,
    idle: Mutex<Vec<Worker>>,
    metrics: PoolMetrics,
}

impl DynamicWorkerPool {
    pub fn new(
        min_idle: usize,
        router: &WorkerRouterData,
        registry: &HandlerRegistry,
    ) -> Result<Self, PoolError> {
        Self::with_options(min_idle, router, registry, WorkerOptions::default())
    }

    pub fn from_config(
        config: &PoolConfig,
        router: &WorkerRouterData,
        registry: &HandlerRegistry,
    ) -> Result<Self, PoolError> {
        Self::with_options(config.workers, router, registry, config.worker_options())
    }

    pub fn with_options(
        min_idle: usize,
        router: &WorkerRouterData,
        registry: &HandlerRegistry,
        options: WorkerOptions,
    ) -> Result<Self, PoolError> {
        check_worker_count(min_idle)?;
        let pool = Self {
            id: PoolId::new(),
            min_idle,
            router: Arc::new(registry.resolve(router)?),
            options,
            idle: Mutex::new(Vec::with_capacity(min_idle)),
            metrics: PoolMetrics::new(),
        };

        let mut warm = Vec::with_capacity(min_idle);
        for _ in 0..min_idle {
            warm.push(pool.spawn_worker()?);
        }
        pool.metrics.set_idle(warm.len());
        *pool.idle.lock() = warm;

        info!(pool = %pool.id, min_idle, "Dynamic worker pool started");
        Ok(pool)
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    fn spawn_worker(&self) -> Result<Worker, PoolError> {
        let worker = Worker::spawn(&self.router, self.options)?;
        membership::enroll(worker.id(), self.id);
        self.metrics.record_spawn();
        Ok(worker)
    }
}

impl WorkerPool for DynamicWorkerPool {
    fn id(&self) -> PoolId {
        self.id
    }

    fn take(&self) -> Result<Worker, PoolError> {
        let reused = {
            let mut idle = self.idle.lock();
            let worker = idle.pop();
            self.metrics.set_idle(idle.len());
            worker
        };
        let worker = match reused {
            Some(worker) => worker,
            None => {
                let worker = self.spawn_worker()?;
                debug!(pool = %self.id, worker = %worker.id(), "Spawned worker on demand");
                worker
            }
        };
        self.metrics.checked_out_inc();
        Ok(worker)
    }

    fn release(&self, worker: Worker) -> Result<(), ForeignWorker> {
        if !membership::belongs_to(worker.id(), self.id) {
            self.metrics.record_reject();
            warn!(pool = %self.id, worker = %worker.id(), "Rejected release of foreign worker");
            return Err(ForeignWorker(worker));
        }

        let surplus = {
            let mut idle = self.idle.lock();
            if idle.len() >= self.min_idle {
                Some(worker)
            } else {
                idle.push(worker);
                self.metrics.set_idle(idle.len());
                None
            }
        };
        self.metrics.checked_out_dec();

        if let Some(worker) = surplus {
            debug!(pool = %self.id, worker = %worker.id(), "Terminating surplus worker");
            worker.terminate();
            self.metrics.record_terminate();
        }
        Ok(())
    }

    fn retire(&self, worker: Worker) {
        let ours = membership::belongs_to(worker.id(), self.id);
        let retired = worker.id();
        worker.terminate();
        if ours {
            self.metrics.checked_out_dec();
            self.metrics.record_terminate();
            info!(pool = %self.id, worker = %retired, "Retired worker");
        } else {
            warn!(pool = %self.id, worker = %retired, "Retired a foreign worker");
        }
    }

    fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }
}
