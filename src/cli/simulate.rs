//! Synthetic traffic for `keiro simulate`.
//!
//! Builds a small route set covering every response shape (inline text, a
//! streamed binary body, an echoed request body, a failing handler and the
//! not-found path), then drives it from caller coroutines through a
//! [`Forwarder`].

use std::time::Instant;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use http::header::HeaderValue;
use http::StatusCode;
use may::coroutine;
use serde::Serialize;
use tracing::{info, warn};

use crate::forwarder::Forwarder;
use crate::middleware::TracingMiddleware;
use crate::pool::{build_pool, PoolConfig, PoolMetricsSnapshot};
use crate::registry::{HandlerRegistry, RouteModule, WorkerRouterData};
use crate::web::{Request, Response};
use crate::worker::DEFAULT_STACK_SIZE;

const CHUNK_SIZE: usize = 4096;
const BASE_URL: &str = "http://simulate.local";

/// What to send.
#[derive(Debug, Clone, Copy)]
pub struct SimulationPlan {
    pub requests: usize,
    pub concurrency: usize,
    pub blob_size: usize,
}

/// Outcome counts for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub ok: usize,
    pub client_errors: usize,
    pub server_errors: usize,
    /// Exchanges that returned a forwarder error instead of a response
    pub failed: usize,
    pub bytes_received: usize,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.ok += other.ok;
        self.client_errors += other.client_errors;
        self.server_errors += other.server_errors;
        self.failed += other.failed;
        self.bytes_received += other.bytes_received;
    }

    fn record(&mut self, status: StatusCode, bytes: usize) {
        if status.is_server_error() {
            self.server_errors += 1;
        } else if status.is_client_error() {
            self.client_errors += 1;
        } else {
            self.ok += 1;
        }
        self.bytes_received += bytes;
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub strategy: String,
    pub workers: usize,
    pub requests: usize,
    pub concurrency: usize,
    #[serde(flatten)]
    pub tally: Tally,
    pub elapsed_ms: u64,
    pub pool: PoolMetricsSnapshot,
}

/// Demo modules and their route table.
pub fn demo_routes(blob_size: usize) -> (WorkerRouterData, HandlerRegistry) {
    let mut registry = HandlerRegistry::new();
    registry
        .register_middleware("middleware/trace", TracingMiddleware)
        .register_route(
            "routes/hello",
            RouteModule::new().get(|event| {
                let name = event.query("name").unwrap_or_else(|| "world".to_string());
                Ok(Response::text(StatusCode::OK, format!("hello {name}")))
            }),
        )
        .register_route(
            "routes/blob",
            RouteModule::new().get(move |_| {
                let mut remaining = blob_size;
                let chunks = std::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let len = remaining.min(CHUNK_SIZE);
                    remaining -= len;
                    Some(Ok(Bytes::from(vec![0xA5; len])))
                });
                Ok(Response::stream(
                    StatusCode::OK,
                    HeaderValue::from_static("application/octet-stream"),
                    chunks,
                ))
            }),
        )
        .register_route(
            "routes/echo",
            RouteModule::new().post(|mut event| {
                let body = event.request.take_body().collect()?;
                Ok(Response::bytes(
                    StatusCode::OK,
                    HeaderValue::from_static("application/octet-stream"),
                    body,
                ))
            }),
        )
        .register_route(
            "routes/fail",
            RouteModule::new().get(|_| Err(anyhow!("simulated handler failure"))),
        );

    let routes = WorkerRouterData::new()
        .middleware("middleware/trace")
        .route("/hello", "routes/hello")
        .route("/blob", "routes/blob")
        .route("/echo", "routes/echo")
        .route("/fail", "routes/fail");
    (routes, registry)
}

fn request_for(n: usize) -> Request {
    match n % 5 {
        0 => Request::get(format!("{BASE_URL}/hello?name=caller-{n}")),
        1 => Request::get(format!("{BASE_URL}/blob")),
        2 => Request::post(format!("{BASE_URL}/echo"))
            .with_body(Bytes::from(format!("payload {n}").into_bytes())),
        3 => Request::get(format!("{BASE_URL}/fail")),
        _ => Request::get(format!("{BASE_URL}/missing/{n}")),
    }
}

fn drive(forwarder: &Forwarder, first: usize, count: usize, stride: usize) -> Tally {
    let mut tally = Tally::default();
    for i in 0..count {
        let n = first + i * stride;
        let response = match forwarder.forward(request_for(n)) {
            Ok(response) => response,
            Err(err) => {
                warn!(request = n, error = %err, "Simulated request failed");
                tally.failed += 1;
                continue;
            }
        };
        let status = response.status();
        match response.into_body().collect() {
            Ok(bytes) => tally.record(status, bytes.len()),
            Err(err) => {
                warn!(request = n, error = %err, "Simulated response body failed");
                tally.failed += 1;
            }
        }
    }
    tally
}

/// Run `plan` against a pool built from `config`.
pub fn run_simulation(config: &PoolConfig, plan: &SimulationPlan) -> anyhow::Result<SimulationReport> {
    let (routes, registry) = demo_routes(plan.blob_size);
    let pool = build_pool(config, &routes, &registry).context("failed to start worker pool")?;
    let forwarder = Forwarder::new(pool);

    info!(
        strategy = %config.strategy,
        workers = config.workers,
        requests = plan.requests,
        concurrency = plan.concurrency,
        "Starting simulation"
    );
    let started = Instant::now();

    let mut callers = Vec::with_capacity(plan.concurrency);
    for caller in 0..plan.concurrency {
        // Caller k sends requests k, k + c, k + 2c, ...
        let count = plan.requests / plan.concurrency
            + usize::from(caller < plan.requests % plan.concurrency);
        let forwarder = forwarder.clone();
        let stride = plan.concurrency;
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure owns its forwarder clone and shares nothing else.
        let handle = unsafe {
            coroutine::Builder::new()
                .name(format!("caller-{caller}"))
                .stack_size(DEFAULT_STACK_SIZE)
                .spawn(move || drive(&forwarder, caller, count, stride))
        }
        .context("failed to spawn caller coroutine")?;
        callers.push(handle);
    }

    let mut tally = Tally::default();
    for handle in callers {
        let partial = handle
            .join()
            .map_err(|_| anyhow!("caller coroutine panicked"))?;
        tally.merge(partial);
    }
    let elapsed = started.elapsed();

    let report = SimulationReport {
        strategy: config.strategy.to_string(),
        workers: config.workers,
        requests: plan.requests,
        concurrency: plan.concurrency,
        tally,
        elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        pool: forwarder.metrics(),
    };
    info!(
        ok = report.tally.ok,
        server_errors = report.tally.server_errors,
        failed = report.tally.failed,
        elapsed_ms = report.elapsed_ms,
        "Simulation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::pool::PoolStrategy;

    fn config(strategy: PoolStrategy) -> PoolConfig {
        PoolConfig {
            workers: 2,
            strategy,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_request_mix_covers_every_route() {
        let urls: Vec<String> = (0..5).map(|n| request_for(n).url().to_string()).collect();
        assert!(urls[0].contains("/hello"));
        assert!(urls[1].ends_with("/blob"));
        assert!(urls[2].ends_with("/echo"));
        assert!(urls[3].ends_with("/fail"));
        assert!(urls[4].contains("/missing/"));
    }

    #[test]
    fn test_simulation_counts_every_request() {
        let plan = SimulationPlan {
            requests: 25,
            concurrency: 3,
            blob_size: 10_000,
        };
        let report = run_simulation(&config(PoolStrategy::Fixed), &plan).unwrap();
        let t = report.tally;
        assert_eq!(t.ok + t.client_errors + t.server_errors + t.failed, 25);
        assert_eq!(t.failed, 0);
        // 5 of each kind: /fail is a 500, /missing a 404
        assert_eq!(t.server_errors, 5);
        assert_eq!(t.client_errors, 5);
        assert_eq!(report.pool.checked_out, 0);
        assert_eq!(report.pool.idle, 2);
    }

    #[test]
    fn test_simulation_on_dynamic_pool() {
        let plan = SimulationPlan {
            requests: 10,
            concurrency: 4,
            blob_size: 100,
        };
        let report = run_simulation(&config(PoolStrategy::Dynamic), &plan).unwrap();
        assert_eq!(report.tally.failed, 0);
        assert_eq!(report.pool.checked_out, 0);
        assert!(report.pool.idle <= 2);
    }
}
