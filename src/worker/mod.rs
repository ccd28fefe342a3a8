//! # Worker Module
//!
//! A worker is a `may` coroutine with a private route table, reachable only
//! through its channels:
//!
//! - request parts in (`Sender<RequestParts>`)
//! - response parts out (`Receiver<ResponseParts>`)
//! - chunk acknowledgements in (`Sender<ChunkAck>`)
//!
//! The [`Worker`] value is the owning handle. Whoever holds it is the only
//! party that can talk to the coroutine, which is what makes "one exchange per
//! worker" hold without locks. Dropping the handle closes the channels and the
//! coroutine exits on its own; [`Worker::terminate`] also waits for it.

mod dispatcher;
mod exchange;

use std::fmt;
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;

use may::coroutine::{self, JoinHandle};
use may::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ForwardError, PoolError};
use crate::ids::WorkerId;
use crate::pool::membership;
use crate::protocol::{ChunkAck, RequestParts, ResponseParts, DEFAULT_STREAM_WINDOW};
use crate::registry::ResolvedRouter;

use dispatcher::WorkerDispatcher;
pub use dispatcher::EXCHANGE_ID_HEADER;
pub use exchange::ExchangeState;

/// Default coroutine stack size for workers (64KB).
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Per-worker runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Coroutine stack size in bytes
    pub stack_size: usize,
    /// Maximum unacknowledged response chunks in flight
    pub stream_window: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            stream_window: DEFAULT_STREAM_WINDOW,
        }
    }
}

/// Owning handle to a worker coroutine.
pub struct Worker {
    id: WorkerId,
    requests: mpsc::Sender<RequestParts>,
    responses: mpsc::Receiver<ResponseParts>,
    acks: mpsc::Sender<ChunkAck>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker and wait until it has built its route table.
    pub fn spawn(router: &Arc<ResolvedRouter>, options: WorkerOptions) -> Result<Self, PoolError> {
        let id = WorkerId::next();
        let (request_tx, request_rx) = mpsc::channel::<RequestParts>();
        let (response_tx, response_rx) = mpsc::channel::<ResponseParts>();
        let (ack_tx, ack_rx) = mpsc::channel::<ChunkAck>();
        let (ready_tx, ready_rx) = mpsc::channel::<()>();
        let router = Arc::clone(router);

        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure is Send + 'static and owns everything it touches; the only
        // shared state is the read-only router behind an Arc.
        let handle = unsafe {
            coroutine::Builder::new()
                .name(id.to_string())
                .stack_size(options.stack_size)
                .spawn(move || {
                    let dispatcher = WorkerDispatcher::new(
                        id,
                        &router,
                        response_tx,
                        ack_rx,
                        options.stream_window,
                    );
                    drop(router);
                    if ready_tx.send(()).is_err() {
                        return;
                    }
                    dispatcher.run(request_rx);
                })
        }
        .map_err(|source| PoolError::Spawn { source })?;

        if ready_rx.recv().is_err() {
            if handle.join().is_err() {
                warn!(worker = %id, "Worker panicked during startup");
            }
            return Err(PoolError::StartupLost { worker: id });
        }

        debug!(
            worker = %id,
            stack_size = options.stack_size,
            stream_window = options.stream_window,
            "Worker spawned"
        );

        Ok(Self {
            id,
            requests: request_tx,
            responses: response_rx,
            acks: ack_tx,
            handle: Some(handle),
        })
    }

    /// A handle over caller-supplied channels with no coroutine behind it.
    #[cfg(test)]
    pub(crate) fn from_channels(
        requests: mpsc::Sender<RequestParts>,
        responses: mpsc::Receiver<ResponseParts>,
        acks: mpsc::Sender<ChunkAck>,
    ) -> Self {
        Self {
            id: WorkerId::next(),
            requests,
            responses,
            acks,
            handle: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Send one request part.
    pub fn send(&self, part: RequestParts) -> Result<(), ForwardError> {
        self.requests
            .send(part)
            .map_err(|_| ForwardError::WorkerUnavailable { worker: self.id })
    }

    /// Block until the next response part arrives.
    pub fn recv(&self) -> Result<ResponseParts, ForwardError> {
        self.responses
            .recv()
            .map_err(|_| ForwardError::WorkerUnavailable { worker: self.id })
    }

    /// Take the next response part if one is already queued.
    pub fn try_recv(&self) -> Result<Option<ResponseParts>, ForwardError> {
        match self.responses.try_recv() {
            Ok(part) => Ok(Some(part)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ForwardError::WorkerUnavailable { worker: self.id }),
        }
    }

    /// Acknowledge one consumed data chunk.
    pub fn ack(&self) -> Result<(), ForwardError> {
        self.acks
            .send(ChunkAck)
            .map_err(|_| ForwardError::WorkerUnavailable { worker: self.id })
    }

    /// Close the worker's channels and wait for its coroutine to exit.
    ///
    /// Blocks until the worker's next channel operation, which fails once the
    /// channels are closed. A handler busy computing (or producing its next
    /// stream chunk) finishes that step first.
    pub fn terminate(mut self) {
        let id = self.id;
        let handle = self.handle.take();
        drop(self);
        if let Some(handle) = handle {
            match handle.join() {
                Ok(()) => debug!(worker = %id, "Worker terminated"),
                Err(_) => warn!(worker = %id, "Worker coroutine panicked"),
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        membership::forget(self.id);
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").field("id", &self.id).finish()
    }
}
