use std::time::Instant;

use tracing::{field, info, info_span, warn};

use super::{Middleware, Next};
use crate::handler::{HandlerResult, RequestEvent};

/// Records a `request` span per exchange with method, path, status and latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn handle(&self, event: RequestEvent, next: Next<'_>) -> HandlerResult {
        let span = info_span!(
            "request",
            exchange_id = %event.exchange_id,
            method = %event.request.method(),
            path = %event.url.path(),
            route = field::Empty,
            status = field::Empty,
            latency_ms = field::Empty,
        );
        let _entered = span.enter();
        if let Some(route) = &event.route_id {
            span.record("route", route.as_ref());
        }

        let start = Instant::now();
        let result = next(event);
        let latency_ms = start.elapsed().as_millis() as u64;
        span.record("latency_ms", latency_ms);

        match &result {
            Ok(response) => {
                span.record("status", response.status().as_u16());
                info!(status = response.status().as_u16(), latency_ms, "Request handled");
            }
            Err(err) => {
                warn!(error = %err, latency_ms, "Request handler failed");
            }
        }
        result
    }
}
