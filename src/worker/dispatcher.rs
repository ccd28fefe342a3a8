use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use bytes::BytesMut;
use http::StatusCode;
use may::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::exchange::ExchangeState;
use crate::error::ProtocolViolation;
use crate::handler::{HandlerResult, RequestEvent};
use crate::ids::{ExchangeId, WorkerId};
use crate::middleware::Middleware;
use crate::protocol::{decode_request, ChunkAck, RequestParts, ResponseParts, WireHeaders};
use crate::registry::{ResolvedRouter, RouteModule};
use crate::router::RouteTable;
use crate::web::{Body, Response};

/// Header carrying the exchange id between forwarder and worker.
pub const EXCHANGE_ID_HEADER: &str = "x-request-id";

/// The worker's outbound channel is gone; the worker must stop.
struct Disconnected;

/// A request whose body is still arriving.
struct PendingRequest {
    url: String,
    method: String,
    headers: WireHeaders,
    body: BytesMut,
}

/// Runs inside a worker coroutine: turns inbound request parts into handler
/// calls and streams the result back.
pub(crate) struct WorkerDispatcher {
    worker: WorkerId,
    table: RouteTable<Arc<RouteModule>>,
    middleware: Option<Arc<dyn Middleware>>,
    not_found: Option<Arc<RouteModule>>,
    responses: mpsc::Sender<ResponseParts>,
    acks: mpsc::Receiver<ChunkAck>,
    stream_window: usize,
    state: ExchangeState,
}

impl WorkerDispatcher {
    pub(crate) fn new(
        worker: WorkerId,
        router: &ResolvedRouter,
        responses: mpsc::Sender<ResponseParts>,
        acks: mpsc::Receiver<ChunkAck>,
        stream_window: usize,
    ) -> Self {
        Self {
            worker,
            table: router.build_table(),
            middleware: router.middleware().cloned(),
            not_found: router.not_found().cloned(),
            responses,
            acks,
            stream_window: stream_window.max(1),
            state: ExchangeState::Idle,
        }
    }

    /// Serve exchanges until the inbound channel closes.
    pub(crate) fn run(mut self, requests: mpsc::Receiver<RequestParts>) {
        debug!(worker = %self.worker, routes = self.table.len(), "Worker ready");

        let mut pending: Option<PendingRequest> = None;
        for part in requests.iter() {
            match self.state.accept(part.kind()) {
                Ok(next) => self.state = next,
                Err(violation) => {
                    pending = None;
                    if self.abort(violation).is_err() {
                        break;
                    }
                    continue;
                }
            }

            match part {
                RequestParts::Request {
                    url,
                    method,
                    headers,
                } => {
                    pending = Some(PendingRequest {
                        url,
                        method,
                        headers,
                        body: BytesMut::new(),
                    });
                }
                RequestParts::Body { data } => {
                    if let Some(request) = pending.as_mut() {
                        request.body.extend_from_slice(&data);
                    }
                }
                RequestParts::Done => {
                    let Some(request) = pending.take() else {
                        continue;
                    };
                    if self.serve(request).is_err() {
                        break;
                    }
                }
            }
        }

        debug!(worker = %self.worker, "Worker exiting");
    }

    fn abort(&mut self, violation: ProtocolViolation) -> Result<(), Disconnected> {
        if !self.state.in_exchange() {
            warn!(worker = %self.worker, %violation, "Dropping message outside an exchange");
            return Ok(());
        }
        warn!(worker = %self.worker, %violation, "Aborting exchange");
        self.state = ExchangeState::Idle;
        self.send(ResponseParts::end())
    }

    fn serve(&mut self, request: PendingRequest) -> Result<(), Disconnected> {
        self.state = ExchangeState::Dispatching;
        let exchange_id = ExchangeId::from_header_or_new(
            request
                .headers
                .get(EXCHANGE_ID_HEADER)
                .and_then(|values| values.first())
                .map(String::as_str),
        );
        let start = Instant::now();

        let response = self.dispatch(exchange_id, request);
        let status = response.status().as_u16();
        self.respond(exchange_id, response)?;
        self.state = ExchangeState::Done;

        debug!(
            worker = %self.worker,
            exchange_id = %exchange_id,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Exchange complete"
        );
        Ok(())
    }

    /// Produce the response for one request. Never fails: every error is
    /// turned into a response here.
    fn dispatch(&self, exchange_id: ExchangeId, pending: PendingRequest) -> Response {
        let PendingRequest {
            url,
            method,
            headers,
            body,
        } = pending;

        let request = match decode_request(url, &method, &headers, Body::from(body.freeze())) {
            Ok(request) => request,
            Err(violation) => {
                warn!(worker = %self.worker, exchange_id = %exchange_id, %violation, "Rejecting request");
                return Response::text(StatusCode::BAD_REQUEST, violation.to_string());
            }
        };
        let url = match Url::parse(request.url()) {
            Ok(url) => url,
            Err(err) => {
                warn!(worker = %self.worker, exchange_id = %exchange_id, url = %request.url(), error = %err, "Rejecting request with invalid URL");
                return Response::text(StatusCode::BAD_REQUEST, format!("invalid url: {err}"));
            }
        };

        let mut event = RequestEvent::new(exchange_id, request, url);
        let method = event.request.method().clone();

        let routed = self.table.lookup(event.url.path()).and_then(|hit| {
            let handler = hit.value.handler_for(&method).cloned()?;
            Some((hit.route_id, hit.params, handler))
        });
        let handler = match routed {
            Some((route_id, params, handler)) => {
                event.route_id = Some(route_id);
                event.params = params;
                Some(handler)
            }
            None => self
                .not_found
                .as_ref()
                .and_then(|module| module.handler_for(&method).cloned()),
        };

        let endpoint = |event: RequestEvent| -> HandlerResult {
            match &handler {
                Some(handler) => handler(event),
                None => Ok(Response::not_found()),
            }
        };

        let result = guarded(|| match &self.middleware {
            Some(middleware) => middleware.handle(event, &endpoint),
            None => endpoint(event),
        });

        match result {
            Ok(response) => response,
            Err(err) => {
                error!(
                    worker = %self.worker,
                    exchange_id = %exchange_id,
                    error = %err,
                    "Handler failed, sending 500"
                );
                Response::internal_error()
            }
        }
    }

    fn respond(&mut self, exchange_id: ExchangeId, mut response: Response) -> Result<(), Disconnected> {
        let body = response.take_body();

        if response.is_text() {
            let text = match guarded(|| body.text()) {
                Ok(text) => text,
                Err(err) => {
                    error!(
                        worker = %self.worker,
                        exchange_id = %exchange_id,
                        error = %err,
                        "Text body failed, sending 500"
                    );
                    response = Response::internal_error();
                    response.take_body().text().unwrap_or_default()
                }
            };
            self.send(ResponseParts::head(&response, Some(text)))?;
            self.state = ExchangeState::ResponseSent;
            return Ok(());
        }

        self.send(ResponseParts::head(&response, None))?;
        self.state = ExchangeState::ResponseSent;
        self.stream_body(exchange_id, body)
    }

    /// Send the body as data chunks, keeping at most `stream_window`
    /// unacknowledged, then the terminal chunk. Returns once every chunk has
    /// been acknowledged.
    fn stream_body(&mut self, exchange_id: ExchangeId, body: Body) -> Result<(), Disconnected> {
        let mut chunks = body.into_chunks();
        let mut in_flight = 0usize;
        let mut sent = 0usize;

        loop {
            let next = match panic::catch_unwind(AssertUnwindSafe(|| chunks.next())) {
                Ok(next) => next,
                Err(payload) => Some(Err(anyhow!(
                    "body stream panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            };
            match next {
                None => break,
                Some(Ok(data)) => {
                    if in_flight >= self.stream_window {
                        self.wait_ack()?;
                        in_flight -= 1;
                    }
                    self.send(ResponseParts::chunk(data))?;
                    self.state = ExchangeState::Chunk;
                    in_flight += 1;
                    sent += 1;
                }
                Some(Err(err)) => {
                    error!(
                        worker = %self.worker,
                        exchange_id = %exchange_id,
                        chunks_sent = sent,
                        error = %err,
                        "Response body failed mid-stream, truncating"
                    );
                    break;
                }
            }
        }

        self.send(ResponseParts::end())?;
        while in_flight > 0 {
            self.wait_ack()?;
            in_flight -= 1;
        }
        Ok(())
    }

    fn send(&self, part: ResponseParts) -> Result<(), Disconnected> {
        self.responses.send(part).map_err(|_| {
            info!(worker = %self.worker, "Response channel closed");
            Disconnected
        })
    }

    fn wait_ack(&self) -> Result<(), Disconnected> {
        self.acks.recv().map(|ChunkAck| ()).map_err(|_| {
            info!(worker = %self.worker, "Acknowledgement channel closed");
            Disconnected
        })
    }
}

/// Run `f`, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
