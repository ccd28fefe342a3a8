mod core;
mod tracing;

pub use core::{Chain, Middleware, Next};
pub use tracing::TracingMiddleware;
