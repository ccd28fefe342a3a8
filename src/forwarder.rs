//! # Request Forwarder
//!
//! Caller-side half of an exchange: checks a worker out of a pool, streams a
//! [`Request`] to it as protocol messages and rebuilds the [`Response`].
//!
//! ```text
//! caller ──request/body*/done──▶ worker
//! caller ◀──response(inline)──── worker            text/* responses
//! caller ◀──response, chunk*, chunk(done)── worker  everything else
//! ```
//!
//! The worker stays checked out until its exchange is over. For inline
//! responses that is before `forward()` returns; for streamed responses it is
//! when the returned body reaches its terminal chunk or is dropped. Every
//! non-text response is streamed, including an empty one such as the default
//! 404, so holding such a [`Response`] unread holds its worker. A
//! [`WorkerLease`] guard returns the worker on every path, and retires it
//! instead when the exchange broke in a way that leaves the worker's state
//! unknown.
//!
//! Dropping a streamed body early does not wait for the stream to finish.
//! Chunks the worker has already queued are drained; if the terminal chunk
//! is among them the worker goes back to the pool, otherwise it is retired
//! (a fixed pool spawns a replacement).
//!
//! ```rust,no_run
//! use keiro::forwarder::Forwarder;
//! use keiro::pool::FixedWorkerPool;
//! use keiro::registry::{HandlerRegistry, RouteModule, WorkerRouterData};
//! use keiro::web::{Request, Response};
//! use http::StatusCode;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut registry = HandlerRegistry::new();
//! registry.register_route("hello", RouteModule::new().get(|_| Ok(Response::text(StatusCode::OK, "hi"))));
//! let routes = WorkerRouterData::new().route("/hello", "hello");
//!
//! let pool = FixedWorkerPool::new(2, &routes, &registry)?;
//! let forwarder = Forwarder::new(Arc::new(pool));
//! let response = forwarder.forward(Request::get("http://localhost/hello"))?;
//! assert_eq!(response.into_body().text()?, "hi");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::anyhow;
use http::header::HeaderValue;
use tracing::{debug, warn};

use crate::error::{ForwardError, ProtocolViolation};
use crate::ids::{ExchangeId, WorkerId};
use crate::pool::{ForeignWorker, PoolMetricsSnapshot, WorkerPool};
use crate::protocol::{decode_response, PartKind, RequestParts, ResponseParts};
use crate::web::{Body, BodyChunk, Request, Response};
use crate::worker::{Worker, EXCHANGE_ID_HEADER};

/// Sends requests to workers from a pool.
#[derive(Clone)]
pub struct Forwarder {
    pool: Arc<dyn WorkerPool>,
}

impl Forwarder {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.pool.metrics()
    }

    /// Run one exchange.
    ///
    /// Blocks while the pool has no worker to give (fixed pools) and while
    /// the request body is being sent. Any response whose content type is not
    /// `text/*`, even one with an empty body, keeps the worker checked out
    /// until its body is read to the end or dropped.
    pub fn forward(&self, mut request: Request) -> Result<Response, ForwardError> {
        let exchange_id = ExchangeId::from_header_or_new(request.header(EXCHANGE_ID_HEADER));
        if request.header(EXCHANGE_ID_HEADER).is_none() {
            if let Ok(value) = HeaderValue::from_str(&exchange_id.to_string()) {
                request.headers_mut().insert(EXCHANGE_ID_HEADER, value);
            }
        }

        let worker = self.pool.take()?;
        let mut lease = WorkerLease::new(Arc::clone(&self.pool), worker);
        debug!(
            exchange_id = %exchange_id,
            worker = %lease.worker_id,
            method = %request.method(),
            url = %request.url(),
            "Forwarding request"
        );

        let body = request.take_body();
        lease.send(RequestParts::head(&request))?;
        if request.allows_body() {
            for chunk in body.into_chunks() {
                match chunk {
                    Ok(data) => lease.send(RequestParts::Body { data })?,
                    Err(source) => {
                        lease.poison();
                        warn!(
                            exchange_id = %exchange_id,
                            worker = %lease.worker_id,
                            error = %source,
                            "Request body failed, retiring worker"
                        );
                        return Err(ForwardError::RequestBody {
                            worker: lease.worker_id,
                            source,
                        });
                    }
                }
            }
        }
        lease.send(RequestParts::Done)?;

        read_response(lease, exchange_id)
    }
}

fn read_response(mut lease: WorkerLease, exchange_id: ExchangeId) -> Result<Response, ForwardError> {
    match lease.recv()? {
        ResponseParts::Response {
            status,
            status_text,
            headers,
            body: Some(text),
        } => {
            let response = decode_response(status, status_text, &headers, Body::from(text))
                .map_err(|violation| lease.violation(violation))?;
            debug!(exchange_id = %exchange_id, worker = %lease.worker_id, status, "Inline response");
            Ok(response)
        }
        ResponseParts::Response {
            status,
            status_text,
            headers,
            body: None,
        } => {
            let response = decode_response(status, status_text, &headers, Body::Empty)
                .map_err(|violation| lease.violation(violation))?;
            debug!(exchange_id = %exchange_id, worker = %lease.worker_id, status, "Streamed response");
            let stream = WorkerBodyStream {
                lease: Some(lease),
                exchange_id,
            };
            Ok(response.with_body(Body::from_stream(stream)))
        }
        ResponseParts::Chunk { done: true, .. } => {
            // The worker aborted and is back in IDLE, so it can be reused
            warn!(exchange_id = %exchange_id, worker = %lease.worker_id, "Exchange ended without a response");
            Err(ForwardError::ExchangeIncomplete {
                worker: lease.worker_id,
            })
        }
        ResponseParts::Chunk { done: false, .. } => Err(lease.violation(
            ProtocolViolation::unexpected("AWAITING_RESPONSE", PartKind::Chunk),
        )),
    }
}

/// Owns a checked-out worker for the length of one exchange.
///
/// Dropping the lease releases the worker to its pool, or retires it if the
/// lease was poisoned.
pub struct WorkerLease {
    pool: Arc<dyn WorkerPool>,
    worker: Option<Worker>,
    worker_id: WorkerId,
    poisoned: bool,
}

impl WorkerLease {
    pub fn new(pool: Arc<dyn WorkerPool>, worker: Worker) -> Self {
        Self {
            pool,
            worker_id: worker.id(),
            worker: Some(worker),
            poisoned: false,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Retire the worker instead of releasing it.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn worker(&self) -> Result<&Worker, ForwardError> {
        self.worker.as_ref().ok_or(ForwardError::WorkerUnavailable {
            worker: self.worker_id,
        })
    }

    /// Send a request part; a failure poisons the lease.
    pub fn send(&mut self, part: RequestParts) -> Result<(), ForwardError> {
        let result = self.worker().and_then(|worker| worker.send(part));
        if result.is_err() {
            self.poison();
        }
        result
    }

    /// Receive a response part; a failure poisons the lease.
    pub fn recv(&mut self) -> Result<ResponseParts, ForwardError> {
        let result = self.worker().and_then(Worker::recv);
        if result.is_err() {
            self.poison();
        }
        result
    }

    /// Take a response part the worker has already sent, without waiting.
    fn try_recv(&mut self) -> Result<Option<ResponseParts>, ForwardError> {
        let result = self.worker().and_then(Worker::try_recv);
        if result.is_err() {
            self.poison();
        }
        result
    }

    pub fn ack(&mut self) -> Result<(), ForwardError> {
        let result = self.worker().and_then(Worker::ack);
        if result.is_err() {
            self.poison();
        }
        result
    }

    fn violation(&mut self, violation: ProtocolViolation) -> ForwardError {
        self.poison();
        warn!(worker = %self.worker_id, %violation, "Worker broke protocol, retiring");
        ForwardError::Protocol {
            worker: self.worker_id,
            violation,
        }
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if self.poisoned {
            self.pool.retire(worker);
        } else if let Err(ForeignWorker(worker)) = self.pool.release(worker) {
            warn!(worker = %worker.id(), "Pool refused its own worker, terminating it");
            worker.terminate();
        }
    }
}

/// Body of a streamed response: yields chunks as the worker sends them.
///
/// Each chunk is acknowledged as it is handed out. The lease is dropped, and
/// the worker released, at the terminal chunk.
struct WorkerBodyStream {
    lease: Option<WorkerLease>,
    exchange_id: ExchangeId,
}

impl Iterator for WorkerBodyStream {
    type Item = BodyChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let lease = self.lease.as_mut()?;
        match lease.recv() {
            Ok(ResponseParts::Chunk { done: false, data }) => match lease.ack() {
                Ok(()) => Some(Ok(data.unwrap_or_default())),
                Err(err) => {
                    self.lease = None;
                    Some(Err(err.into()))
                }
            },
            Ok(ResponseParts::Chunk { done: true, .. }) => {
                debug!(exchange_id = %self.exchange_id, worker = %lease.worker_id, "Stream complete");
                self.lease = None;
                None
            }
            Ok(ResponseParts::Response { .. }) => {
                let err = lease.violation(ProtocolViolation::unexpected(
                    "RESPONSE_SENT",
                    PartKind::Response,
                ));
                self.lease = None;
                Some(Err(anyhow!(err)))
            }
            Err(err) => {
                self.lease = None;
                Some(Err(err.into()))
            }
        }
    }
}

impl Drop for WorkerBodyStream {
    fn drop(&mut self) {
        let Some(mut lease) = self.lease.take() else {
            return;
        };
        // Queued chunks stay unacknowledged while draining, so the worker stops
        // at its window and this loop is bounded.
        let mut unacked = 0usize;
        loop {
            match lease.try_recv() {
                Ok(Some(ResponseParts::Chunk { done: false, .. })) => unacked += 1,
                Ok(Some(ResponseParts::Chunk { done: true, .. })) => {
                    for _ in 0..unacked {
                        if lease.ack().is_err() {
                            return;
                        }
                    }
                    debug!(exchange_id = %self.exchange_id, worker = %lease.worker_id, "Abandoned stream was already complete");
                    return;
                }
                Ok(Some(ResponseParts::Response { .. })) | Ok(None) | Err(_) => break,
            }
        }
        debug!(
            exchange_id = %self.exchange_id,
            worker = %lease.worker_id,
            "Stream abandoned mid-exchange, retiring worker"
        );
        lease.poison();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::error::PoolError;
    use crate::ids::PoolId;
    use crate::protocol::{ChunkAck, WireHeaders};
    use bytes::Bytes;
    use http::Method;
    use may::sync::mpsc;
    use parking_lot::Mutex;
    use std::thread;

    /// Single-worker pool around a hand-driven worker handle.
    struct OneWorkerPool {
        id: PoolId,
        worker: Mutex<Option<Worker>>,
    }

    impl WorkerPool for OneWorkerPool {
        fn id(&self) -> PoolId {
            self.id
        }

        fn take(&self) -> Result<Worker, PoolError> {
            self.worker.lock().take().ok_or(PoolError::Closed)
        }

        fn release(&self, worker: Worker) -> Result<(), ForeignWorker> {
            *self.worker.lock() = Some(worker);
            Ok(())
        }

        fn retire(&self, worker: Worker) {
            drop(worker);
        }

        fn metrics(&self) -> PoolMetricsSnapshot {
            PoolMetricsSnapshot::default()
        }
    }

    /// A forwarder whose worker records the kind of every frame it receives
    /// and reports each exchange's frames once `done` arrives.
    fn recording_forwarder() -> (Forwarder, std::sync::mpsc::Receiver<Vec<PartKind>>) {
        let (request_tx, request_rx) = mpsc::channel::<RequestParts>();
        let (response_tx, response_rx) = mpsc::channel::<ResponseParts>();
        let (ack_tx, ack_rx) = mpsc::channel::<ChunkAck>();
        let (frames_tx, frames_rx) = std::sync::mpsc::channel();

        thread::spawn(move || {
            // Inline replies need no acknowledgements, but the channel stays open
            let _acks = ack_rx;
            let mut frames = Vec::new();
            for part in request_rx.iter() {
                frames.push(part.kind());
                if part == RequestParts::Done {
                    let mut headers = WireHeaders::new();
                    headers.insert("content-type".into(), vec!["text/plain".into()]);
                    let reply = ResponseParts::Response {
                        status: 200,
                        status_text: "OK".into(),
                        headers,
                        body: Some("ok".into()),
                    };
                    if response_tx.send(reply).is_err()
                        || frames_tx.send(std::mem::take(&mut frames)).is_err()
                    {
                        return;
                    }
                }
            }
        });

        let pool = OneWorkerPool {
            id: PoolId::new(),
            worker: Mutex::new(Some(Worker::from_channels(request_tx, response_rx, ack_tx))),
        };
        (Forwarder::new(Arc::new(pool)), frames_rx)
    }

    #[test]
    fn test_get_and_head_send_only_request_and_done() {
        let (forwarder, frames) = recording_forwarder();
        for method in [Method::GET, Method::HEAD] {
            let request = Request::new(method.clone(), "http://frames.test/x")
                .with_body(Body::from_chunks(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]));
            let response = forwarder.forward(request).unwrap();
            assert_eq!(response.into_body().text().unwrap(), "ok");
            assert_eq!(
                frames.recv().unwrap(),
                vec![PartKind::Request, PartKind::Done],
                "{method}"
            );
        }
    }

    #[test]
    fn test_other_methods_send_one_frame_per_chunk() {
        let (forwarder, frames) = recording_forwarder();
        let request = Request::new(Method::PUT, "http://frames.test/x").with_body(Body::from_chunks(vec![
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
        ]));
        forwarder.forward(request).unwrap();
        assert_eq!(
            frames.recv().unwrap(),
            vec![PartKind::Request, PartKind::Body, PartKind::Body, PartKind::Done]
        );
    }
}
