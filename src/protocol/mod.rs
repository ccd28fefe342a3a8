//! # Marshalling Protocol
//!
//! Wire messages exchanged between a forwarder and a worker, plus the helpers
//! that convert them to and from [`crate::web`] types.
//!
//! ## Request direction
//!
//! ```text
//! request{method,url,headers} → body{data}* → done
//! ```
//!
//! GET and HEAD requests never produce `body` frames.
//!
//! ## Response direction
//!
//! Two shapes, chosen by the worker from the response `content-type`:
//!
//! ```text
//! text/*     : response{status,statusText,headers,body}
//! otherwise  : response{status,statusText,headers} → chunk{data,done:false}* → chunk{done:true}
//! ```
//!
//! A `chunk{done:true}` that arrives before any `response` means the worker
//! aborted the exchange.
//!
//! ## Flow control
//!
//! Data chunks are acknowledged by the consumer. A worker never has more than
//! [`DEFAULT_STREAM_WINDOW`] (or the configured window) unacknowledged chunks
//! in flight, so a slow reader bounds the worker instead of growing the channel.
//!
//! Requests have no window. The worker buffers the whole body before it
//! dispatches, so acknowledging request chunks would only move that buffer;
//! the size of a request body is bounded by whatever the caller hands to the
//! forwarder.

mod headers;
mod parts;

pub use headers::{headers_to_wire, wire_to_headers, WireHeaders};
pub use parts::{decode_request, decode_response, PartKind, RequestParts, ResponseParts};

/// Default number of unacknowledged response chunks a worker may have in flight.
pub const DEFAULT_STREAM_WINDOW: usize = 16;

/// Acknowledgement for one consumed response chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck;
