use std::sync::Arc;

use crate::handler::{HandlerResult, RequestEvent};

/// Continuation handed to a middleware: runs the rest of the chain and the route handler.
pub type Next<'a> = &'a dyn Fn(RequestEvent) -> HandlerResult;

/// Wraps request handling.
///
/// A middleware may short-circuit by returning a response without calling
/// `next`, rewrite the event before passing it on, or adjust the response
/// `next` returns.
pub trait Middleware: Send + Sync {
    fn handle(&self, event: RequestEvent, next: Next<'_>) -> HandlerResult;
}

impl<F> Middleware for F
where
    F: Fn(RequestEvent, Next<'_>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, event: RequestEvent, next: Next<'_>) -> HandlerResult {
        self(event, next)
    }
}

/// Several middlewares run as one, outermost first.
#[derive(Default, Clone)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, layer: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn push(&mut self, layer: Arc<dyn Middleware>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn run_from(&self, index: usize, event: RequestEvent, next: Next<'_>) -> HandlerResult {
        match self.layers.get(index) {
            Some(layer) => layer.handle(event, &|ev| self.run_from(index + 1, ev, next)),
            None => next(event),
        }
    }
}

impl Middleware for Chain {
    fn handle(&self, event: RequestEvent, next: Next<'_>) -> HandlerResult {
        self.run_from(0, event, next)
    }
}
