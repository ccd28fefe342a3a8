use std::collections::VecDeque;
use std::sync::Arc;

use may::sync::mpsc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{check_worker_count, membership, ForeignWorker, PoolConfig, WaiterOrder, WorkerPool};
use super::{PoolMetrics, PoolMetricsSnapshot};
use crate::error::PoolError;
use crate::ids::PoolId;
use crate::registry::{HandlerRegistry, ResolvedRouter, WorkerRouterData};
use crate::worker::{Worker, WorkerOptions};

struct FixedState {
    idle: VecDeque<Worker>,
    waiters: VecDeque<mpsc::Sender<Worker>>,
}

/// A pool of exactly `size` workers.
///
/// `take()` pops from the back of the idle set; released workers go to the
/// front, so work rotates across all workers. When the idle set is empty the
/// caller is queued and blocks until a release hands it a worker directly.
pub struct FixedWorkerPool {
    id: PoolId,
    size: usize,
    waiter_order: WaiterOrder,
    router: Arc<ResolvedRouter>,
    options: WorkerOptions,
    state: Mutex<FixedState>,
    metrics: PoolMetrics,
}

impl FixedWorkerPool {
    /// Spawn `size` workers with default options.
    pub fn new(
        size: usize,
        router: &WorkerRouterData,
        registry: &HandlerRegistry,
    ) -> Result<Self, PoolError> {
        Self::with_options(size, router, registry, WorkerOptions::default())
    }

    pub fn from_config(
        config: &PoolConfig,
        router: &WorkerRouterData,
        registry: &HandlerRegistry,
    ) -> Result<Self, PoolError> {
        Ok(
            Self::with_options(config.workers, router, registry, config.worker_options())?
                .with_waiter_order(config.waiter_order),
        )
    }

    pub fn with_options(
        size: usize,
        router: &WorkerRouterData,
        registry: &HandlerRegistry,
        options: WorkerOptions,
    ) -> Result<Self, PoolError> {
        check_worker_count(size)?;
        let router = Arc::new(registry.resolve(router)?);
        let id = PoolId::new();
        let metrics = PoolMetrics::new();

        let mut idle = VecDeque::with_capacity(size);
        for _ in 0..size {
            let worker = Worker::spawn(&router, options)?;
            membership::enroll(worker.id(), id);
            metrics.record_spawn();
            idle.push_back(worker);
        }
        metrics.set_idle(idle.len());

        info!(
            pool = %id,
            size,
            stack_size = options.stack_size,
            stream_window = options.stream_window,
            "Fixed worker pool started"
        );

        Ok(Self {
            id,
            size,
            waiter_order: WaiterOrder::default(),
            router,
            options,
            state: Mutex::new(FixedState {
                idle,
                waiters: VecDeque::new(),
            }),
            metrics,
        })
    }

    #[must_use]
    pub fn with_waiter_order(mut self, order: WaiterOrder) -> Self {
        self.waiter_order = order;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hand `worker` to a waiter if there is one, else put it back in the idle
    /// set. The worker must already count as checked out.
    fn put_back(&self, mut worker: Worker) {
        let mut state = self.state.lock();
        loop {
            let waiter = match self.waiter_order {
                WaiterOrder::Fifo => state.waiters.pop_front(),
                WaiterOrder::Lifo => state.waiters.pop_back(),
            };
            self.metrics.set_waiting(state.waiters.len());

            let Some(waiter) = waiter else {
                state.idle.push_front(worker);
                self.metrics.set_idle(state.idle.len());
                self.metrics.checked_out_dec();
                return;
            };
            match waiter.send(worker) {
                Ok(()) => {
                    self.metrics.record_handoff();
                    return;
                }
                // The waiter gave up; try the next one
                Err(err) => worker = err.0,
            }
        }
    }
}

impl WorkerPool for FixedWorkerPool {
    fn id(&self) -> PoolId {
        self.id
    }

    fn take(&self) -> Result<Worker, PoolError> {
        let handoff = {
            let mut state = self.state.lock();
            if let Some(worker) = state.idle.pop_back() {
                self.metrics.set_idle(state.idle.len());
                self.metrics.checked_out_inc();
                return Ok(worker);
            }
            let (tx, rx) = mpsc::channel();
            state.waiters.push_back(tx);
            self.metrics.set_waiting(state.waiters.len());
            rx
        };

        debug!(pool = %self.id, "Pool exhausted, waiting for a worker");
        // checked_out is unchanged on hand-off: the worker moves between holders
        handoff.recv().map_err(|_| PoolError::Closed)
    }

    fn release(&self, worker: Worker) -> Result<(), ForeignWorker> {
        if !membership::belongs_to(worker.id(), self.id) {
            self.metrics.record_reject();
            warn!(pool = %self.id, worker = %worker.id(), "Rejected release of foreign worker");
            return Err(ForeignWorker(worker));
        }
        self.put_back(worker);
        Ok(())
    }

    fn retire(&self, worker: Worker) {
        let ours = membership::belongs_to(worker.id(), self.id);
        let retired = worker.id();
        worker.terminate();
        if !ours {
            warn!(pool = %self.id, worker = %retired, "Retired a foreign worker");
            return;
        }
        self.metrics.record_terminate();

        match Worker::spawn(&self.router, self.options) {
            Ok(replacement) => {
                membership::enroll(replacement.id(), self.id);
                self.metrics.record_spawn();
                info!(
                    pool = %self.id,
                    retired = %retired,
                    replacement = %replacement.id(),
                    "Replaced retired worker"
                );
                self.put_back(replacement);
            }
            Err(err) => {
                self.metrics.checked_out_dec();
                error!(
                    pool = %self.id,
                    retired = %retired,
                    error = %err,
                    "Could not replace retired worker, pool capacity reduced"
                );
            }
        }
    }

    fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }
}
