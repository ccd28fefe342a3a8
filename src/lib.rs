//! # keiro
//!
//! **keiro** dispatches web requests to a pool of isolated worker coroutines,
//! built on the `may` coroutine runtime. Each worker owns a private copy of a
//! file-system style route table and talks to the outside world only through
//! message channels, so a handler that panics or misbehaves takes down at most
//! one exchange.
//!
//! ## Architecture
//!
//! - **[`web`]** - Web-standard `Request`, `Response` and streamable `Body`
//! - **[`protocol`]** - Messages exchanged between a forwarder and a worker
//! - **[`router`]** - Route ids like `/users/[id]` compiled into a lookup tree
//! - **[`registry`]** - Maps module paths to route modules and middleware
//! - **[`middleware`]** - Composable wrappers around route handlers
//! - **[`worker`]** - The worker coroutine and its dispatch loop
//! - **[`pool`]** - Fixed and dynamic worker pools with shared gauges
//! - **[`forwarder`]** - Caller side of an exchange
//! - **[`config`]** / **[`logging`]** - Layered settings and `tracing` setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Caller
//!     participant Forwarder
//!     participant Pool
//!     participant Worker
//!     participant Handler
//!
//!     Caller->>Forwarder: forward(Request)
//!     Forwarder->>Pool: take()
//!     Pool-->>Forwarder: Worker (blocks if a fixed pool is exhausted)
//!     Forwarder->>Worker: request{method,url,headers}
//!     Forwarder->>Worker: body{data}* (never for GET/HEAD)
//!     Forwarder->>Worker: done
//!     Worker->>Worker: route lookup + middleware chain
//!     Worker->>Handler: RequestEvent
//!     Handler-->>Worker: Response
//!     alt text/* content type
//!         Worker-->>Forwarder: response{status,headers,body}
//!     else anything else
//!         Worker-->>Forwarder: response{status,headers}
//!         loop each chunk
//!             Worker-->>Forwarder: chunk{data}
//!             Forwarder->>Worker: ack
//!         end
//!         Worker-->>Forwarder: chunk{done}
//!     end
//!     Forwarder->>Pool: release(worker)
//!     Forwarder-->>Caller: Response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keiro::config::KeiroConfig;
//! use keiro::forwarder::Forwarder;
//! use keiro::pool::build_pool;
//! use keiro::registry::{HandlerRegistry, RouteModule, WorkerRouterData};
//! use keiro::web::{Request, Response};
//! use http::StatusCode;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = KeiroConfig::load(None)?;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_route(
//!     "routes/users/[id]",
//!     RouteModule::new().get(|event| {
//!         let id = event.param("id").unwrap_or_default();
//!         Ok(Response::text(StatusCode::OK, format!("user {id}")))
//!     }),
//! );
//! let routes = WorkerRouterData::new().route("/users/[id]", "routes/users/[id]");
//!
//! let forwarder = Forwarder::new(build_pool(&config.pool, &routes, &registry)?);
//! let response = forwarder.forward(Request::get("http://localhost/users/7"))?;
//! assert_eq!(response.into_body().text()?, "user 7");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pool Strategies
//!
//! | Strategy  | `take()` when no worker is idle | `release()`                              |
//! |-----------|---------------------------------|------------------------------------------|
//! | `fixed`   | blocks until one is released    | hands the worker to a waiter or idles it |
//! | `dynamic` | spawns a new worker             | idles it, or terminates it if surplus    |
//!
//! ## Configuration
//!
//! See [`config`] for the TOML layout and the `KEIRO_*` environment
//! variables, and [`logging`] for log level, format and sampling.

pub mod cli;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod web;
pub mod worker;

pub use config::KeiroConfig;
pub use error::{ConfigError, ForwardError, PoolError, ProtocolViolation, RegistryError};
pub use forwarder::Forwarder;
pub use handler::{Handler, HandlerResult, RequestEvent};
pub use pool::{build_pool, DynamicWorkerPool, FixedWorkerPool, WorkerPool};
pub use registry::{HandlerRegistry, RouteModule, WorkerRouterData};
pub use web::{Body, Request, Response};
