//! Handler-facing types: the event a route handler receives and the result it returns.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::ids::ExchangeId;
use crate::router::ParamVec;
use crate::web::{Request, Response};

/// Outcome of a handler or middleware. Errors become a default 500 response.
pub type HandlerResult = anyhow::Result<Response>;

/// A route handler function.
pub type Handler = Arc<dyn Fn(RequestEvent) -> HandlerResult + Send + Sync>;

/// Everything a handler gets for one request.
#[derive(Debug)]
pub struct RequestEvent {
    /// Correlation id shared with the forwarder's log lines
    pub exchange_id: ExchangeId,
    /// The reconstructed request, body already buffered
    pub request: Request,
    /// Normalised id of the matched route, `None` when served by the not-found fallback
    pub route_id: Option<Arc<str>>,
    /// Path parameters extracted by the route table
    pub params: ParamVec,
    /// Parsed request URL
    pub url: Url,
    /// Per-request scratch space shared between middleware and the handler
    pub locals: HashMap<String, serde_json::Value>,
}

impl RequestEvent {
    pub fn new(exchange_id: ExchangeId, request: Request, url: Url) -> Self {
        Self {
            exchange_id,
            request,
            route_id: None,
            params: ParamVec::new(),
            url,
            locals: HashMap::new(),
        }
    }

    /// Get a path parameter by name.
    ///
    /// Uses "last write wins" semantics when a name repeats at different depths.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// First query parameter with this name.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn local(&self, key: &str) -> Option<&serde_json::Value> {
        self.locals.get(key)
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.locals.insert(key.into(), value);
    }
}
