//! Which pool owns which worker.
//!
//! Ownership lives in this side table rather than on the worker, so a pool
//! can recognise its own workers on release without trusting the caller.
//! Entries are added when a pool spawns a worker and removed when the worker
//! handle is dropped.

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::ids::{PoolId, WorkerId};

static MEMBERSHIP: Lazy<DashMap<WorkerId, PoolId>> = Lazy::new(DashMap::new);

pub(crate) fn enroll(worker: WorkerId, pool: PoolId) {
    MEMBERSHIP.insert(worker, pool);
}

pub(crate) fn forget(worker: WorkerId) {
    MEMBERSHIP.remove(&worker);
}

/// The pool a worker belongs to, if any.
pub fn owner(worker: WorkerId) -> Option<PoolId> {
    MEMBERSHIP.get(&worker).map(|entry| *entry.value())
}

/// True if `worker` is registered to `pool`.
pub fn belongs_to(worker: WorkerId, pool: PoolId) -> bool {
    owner(worker) == Some(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_and_forget() {
        let worker = WorkerId::next();
        let pool = PoolId::new();
        assert_eq!(owner(worker), None);
        enroll(worker, pool);
        assert!(belongs_to(worker, pool));
        assert!(!belongs_to(worker, PoolId::new()));
        forget(worker);
        assert_eq!(owner(worker), None);
    }
}
