//! # Web Module
//!
//! Minimal web-standard request/response types shared by the forwarder (caller
//! side) and the worker dispatcher (handler side).
//!
//! Platform adapters translate native sockets into [`Request`] and write
//! [`Response`] back out; that translation is not part of this crate.

mod body;
mod request;
mod response;

pub use body::{Body, BodyChunk, BodyChunks, BodyStream};
pub use request::Request;
pub use response::{status_text, Response, TEXT_PLAIN};
