use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters for a worker pool.
///
/// Gauges (`checked_out`, `idle`, `waiting`) move both ways; the rest only
/// grow. All updates are relaxed atomics, so a snapshot taken while the pool
/// is busy may mix values from slightly different moments.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    checked_out: AtomicUsize,
    idle: AtomicUsize,
    waiting: AtomicUsize,
    spawned: AtomicU64,
    terminated: AtomicU64,
    handoffs: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolMetricsSnapshot {
    /// Workers currently held by callers
    pub checked_out: usize,
    /// Workers sitting in the idle set
    pub idle: usize,
    /// Callers blocked in `take()`
    pub waiting: usize,
    /// Workers ever spawned by this pool
    pub spawned: u64,
    /// Workers terminated by this pool
    pub terminated: u64,
    /// Releases handed straight to a waiting caller
    pub handoffs: u64,
    /// Releases refused because the worker belongs elsewhere
    pub rejected: u64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_terminate(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handoff(&self) {
        self.handoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn checked_out_inc(&self) {
        self.checked_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn checked_out_dec(&self) {
        self.checked_out.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn set_idle(&self, idle: usize) {
        self.idle.store(idle, Ordering::Relaxed);
    }

    pub(crate) fn set_waiting(&self, waiting: usize) {
        self.waiting.store(waiting, Ordering::Relaxed);
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            checked_out: self.checked_out.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            waiting: self.waiting.load(Ordering::Relaxed),
            spawned: self.spawned.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
