#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::{setup_may_runtime, test_routes};
use keiro::error::PoolError;
use keiro::pool::{
    build_pool, membership, DynamicWorkerPool, FixedWorkerPool, ForeignWorker, PoolConfig,
    PoolStrategy, WaiterOrder, WorkerPool,
};
use keiro::registry::{HandlerRegistry, WorkerRouterData};
use may::coroutine;
use may::sync::mpsc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn fixed(size: usize) -> Arc<FixedWorkerPool> {
    setup_may_runtime();
    let (routes, registry) = test_routes();
    Arc::new(FixedWorkerPool::new(size, &routes, &registry).unwrap())
}

fn dynamic(min_idle: usize) -> DynamicWorkerPool {
    setup_may_runtime();
    let (routes, registry) = test_routes();
    DynamicWorkerPool::new(min_idle, &routes, &registry).unwrap()
}

/// Spin (yielding) until `cond` holds, for at most a second.
fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        coroutine::sleep(Duration::from_millis(1));
    }
    assert!(cond(), "condition not reached in time");
}

#[test]
fn test_fixed_pool_starts_full() {
    let pool = fixed(3);
    let m = pool.metrics();
    assert_eq!(pool.size(), 3);
    assert_eq!(m.idle, 3);
    assert_eq!(m.checked_out, 0);
    assert_eq!(m.spawned, 3);
}

#[test]
fn test_zero_workers_is_rejected() {
    setup_may_runtime();
    let (routes, registry) = test_routes();
    assert!(matches!(
        FixedWorkerPool::new(0, &routes, &registry),
        Err(PoolError::Configuration { .. })
    ));
    assert!(matches!(
        DynamicWorkerPool::new(0, &routes, &registry),
        Err(PoolError::Configuration { .. })
    ));
}

#[test]
fn test_unknown_module_fails_pool_construction() {
    setup_may_runtime();
    let registry = HandlerRegistry::new();
    let routes = WorkerRouterData::new().route("/x", "missing/module");
    assert!(matches!(
        FixedWorkerPool::new(1, &routes, &registry),
        Err(PoolError::Registry(_))
    ));
}

#[test]
fn test_fixed_pool_workers_are_distinct() {
    let pool = fixed(3);
    let a = pool.take().unwrap();
    let b = pool.take().unwrap();
    let c = pool.take().unwrap();
    let ids: HashSet<_> = [a.id(), b.id(), c.id()].into_iter().collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(pool.metrics().checked_out, 3);
    assert_eq!(pool.metrics().idle, 0);

    for worker in [a, b, c] {
        pool.release(worker).unwrap();
    }
    assert_eq!(pool.metrics().checked_out, 0);
    assert_eq!(pool.metrics().idle, 3);
}

#[test]
fn test_released_workers_rotate() {
    let pool = fixed(2);
    let first = pool.take().unwrap();
    let first_id = first.id();
    pool.release(first).unwrap();

    // Released workers go to the front, takes come from the back
    let next = pool.take().unwrap();
    assert_ne!(next.id(), first_id);
    pool.release(next).unwrap();
}

#[test]
fn test_third_take_waits_for_a_release() {
    let pool = fixed(2);
    let a = pool.take().unwrap();
    let b = pool.take().unwrap();
    let a_id = a.id();

    let (tx, rx) = mpsc::channel();
    let waiter_pool = Arc::clone(&pool);
    let waiter = unsafe {
        coroutine::spawn(move || {
            let worker = waiter_pool.take().unwrap();
            tx.send(worker.id()).unwrap();
            waiter_pool.release(worker).unwrap();
        })
    };

    wait_until(|| pool.metrics().waiting == 1);
    assert!(rx.try_recv().is_err(), "third take must block");
    assert_eq!(pool.metrics().checked_out, 2);

    pool.release(a).unwrap();
    assert_eq!(rx.recv().unwrap(), a_id);
    waiter.join().unwrap();

    let m = pool.metrics();
    assert_eq!(m.waiting, 0);
    assert_eq!(m.handoffs, 1);
    pool.release(b).unwrap();
    assert_eq!(pool.metrics().checked_out, 0);
    assert_eq!(pool.metrics().idle, 2);
}

#[test]
fn test_waiters_are_served_in_configured_order() {
    for (order, expected) in [(WaiterOrder::Fifo, [1, 2]), (WaiterOrder::Lifo, [2, 1])] {
        setup_may_runtime();
        let (routes, registry) = test_routes();
        let pool = Arc::new(
            FixedWorkerPool::new(1, &routes, &registry)
                .unwrap()
                .with_waiter_order(order),
        );
        let held = pool.take().unwrap();

        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::new();
        for n in 1..=2 {
            let waiter_pool = Arc::clone(&pool);
            let tx = tx.clone();
            handles.push(unsafe {
                coroutine::spawn(move || {
                    let worker = waiter_pool.take().unwrap();
                    tx.send(n).unwrap();
                    waiter_pool.release(worker).unwrap();
                })
            });
            wait_until(|| pool_waiting(&pool) == n);
        }

        pool.release(held).unwrap();
        let served = [rx.recv().unwrap(), rx.recv().unwrap()];
        assert_eq!(served, expected, "order {order:?}");
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

fn pool_waiting(pool: &FixedWorkerPool) -> usize {
    pool.metrics().waiting
}

#[test]
fn test_foreign_release_is_rejected() {
    let a = fixed(1);
    let b = fixed(1);
    let worker = a.take().unwrap();
    let id = worker.id();
    assert_eq!(membership::owner(id), Some(a.id()));

    let Err(ForeignWorker(worker)) = b.release(worker) else {
        panic!("release into the wrong pool must fail");
    };
    assert_eq!(worker.id(), id);
    let m = b.metrics();
    assert_eq!(m.idle, 1);
    assert_eq!(m.rejected, 1);

    a.release(worker).unwrap();
    assert_eq!(a.metrics().idle, 1);
}

#[test]
fn test_retire_replaces_fixed_worker() {
    let pool = fixed(1);
    let worker = pool.take().unwrap();
    let old = worker.id();
    pool.retire(worker);

    let m = pool.metrics();
    assert_eq!(m.checked_out, 0);
    assert_eq!(m.idle, 1);
    assert_eq!(m.spawned, 2);
    assert_eq!(m.terminated, 1);
    assert_eq!(membership::owner(old), None);

    let replacement = pool.take().unwrap();
    assert_ne!(replacement.id(), old);
    assert_eq!(membership::owner(replacement.id()), Some(pool.id()));
    pool.release(replacement).unwrap();
}

#[test]
fn test_retire_hands_replacement_to_waiter() {
    let pool = fixed(1);
    let worker = pool.take().unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter_pool = Arc::clone(&pool);
    let waiter = unsafe {
        coroutine::spawn(move || {
            let worker = waiter_pool.take().unwrap();
            tx.send(worker.id()).unwrap();
            waiter_pool.release(worker).unwrap();
        })
    };
    wait_until(|| pool.metrics().waiting == 1);

    let old = worker.id();
    pool.retire(worker);
    assert_ne!(rx.recv().unwrap(), old);
    waiter.join().unwrap();
    assert_eq!(pool.metrics().idle, 1);
}

#[test]
fn test_dynamic_take_never_blocks() {
    let pool = dynamic(1);
    let workers: Vec<_> = (0..5).map(|_| pool.take().unwrap()).collect();

    let m = pool.metrics();
    assert_eq!(m.checked_out, 5);
    assert_eq!(m.spawned, 5);
    assert_eq!(m.idle, 0);

    for worker in workers {
        pool.release(worker).unwrap();
    }
    let m = pool.metrics();
    assert_eq!(m.checked_out, 0);
    assert_eq!(m.idle, 1);
    assert_eq!(m.terminated, 4);
}

#[test]
fn test_dynamic_keeps_min_idle_warm() {
    let pool = dynamic(2);
    assert_eq!(pool.min_idle(), 2);
    assert_eq!(pool.metrics().idle, 2);

    let a = pool.take().unwrap();
    assert_eq!(pool.metrics().idle, 1);
    pool.release(a).unwrap();
    let m = pool.metrics();
    assert_eq!(m.idle, 2);
    assert_eq!(m.terminated, 0);
    assert_eq!(m.spawned, 2);
}

#[test]
fn test_dynamic_retire_does_not_replace() {
    let pool = dynamic(1);
    let worker = pool.take().unwrap();
    pool.retire(worker);
    let m = pool.metrics();
    assert_eq!(m.checked_out, 0);
    assert_eq!(m.idle, 0);
    assert_eq!(m.terminated, 1);

    // The next take spawns on demand
    let worker = pool.take().unwrap();
    assert_eq!(pool.metrics().spawned, 2);
    pool.release(worker).unwrap();
}

#[test]
fn test_build_pool_follows_strategy() {
    setup_may_runtime();
    let (routes, registry) = test_routes();
    for strategy in [PoolStrategy::Fixed, PoolStrategy::Dynamic] {
        let config = PoolConfig {
            workers: 2,
            strategy,
            ..PoolConfig::default()
        };
        let pool = build_pool(&config, &routes, &registry).unwrap();
        assert_eq!(pool.metrics().idle, 2);
        let worker = pool.take().unwrap();
        assert_eq!(membership::owner(worker.id()), Some(pool.id()));
        pool.release(worker).unwrap();
    }
}
