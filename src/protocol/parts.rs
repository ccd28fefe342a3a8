use bytes::Bytes;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::headers::{headers_to_wire, wire_to_headers, WireHeaders};
use crate::error::ProtocolViolation;
use crate::web::{Body, Request, Response};

/// Messages sent from the forwarder to a worker.
///
/// An exchange is always `Request`, zero or more `Body`, then one `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestParts {
    Request {
        url: String,
        method: String,
        headers: WireHeaders,
    },
    Body {
        data: Bytes,
    },
    Done,
}

/// Messages sent from a worker back to the forwarder.
///
/// Either one `Response` carrying an inline body, or a `Response` without a
/// body followed by data chunks and exactly one terminal chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResponseParts {
    Response {
        status: u16,
        #[serde(rename = "statusText")]
        status_text: String,
        headers: WireHeaders,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Chunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Bytes>,
        done: bool,
    },
}

/// Discriminant of a protocol message, used in logs and violation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Request,
    Body,
    Done,
    Response,
    Chunk,
    FinalChunk,
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartKind::Request => "request",
            PartKind::Body => "body",
            PartKind::Done => "done",
            PartKind::Response => "response",
            PartKind::Chunk => "chunk",
            PartKind::FinalChunk => "chunk(done)",
        };
        f.write_str(name)
    }
}

impl RequestParts {
    /// The `request` message describing a request's method, URL and headers.
    pub fn head(request: &Request) -> Self {
        RequestParts::Request {
            url: request.url().to_string(),
            method: request.method().as_str().to_string(),
            headers: headers_to_wire(request.headers()),
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            RequestParts::Request { .. } => PartKind::Request,
            RequestParts::Body { .. } => PartKind::Body,
            RequestParts::Done => PartKind::Done,
        }
    }
}

impl ResponseParts {
    /// The `response` message for a response; `inline` carries the text fast-path body.
    pub fn head(response: &Response, inline: Option<String>) -> Self {
        ResponseParts::Response {
            status: response.status().as_u16(),
            status_text: response.status_text().to_string(),
            headers: headers_to_wire(response.headers()),
            body: inline,
        }
    }

    pub fn chunk(data: Bytes) -> Self {
        ResponseParts::Chunk {
            data: Some(data),
            done: false,
        }
    }

    /// The terminal chunk that closes a streamed body (or aborts an exchange).
    pub fn end() -> Self {
        ResponseParts::Chunk {
            data: None,
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseParts::Chunk { done: true, .. })
    }

    pub fn kind(&self) -> PartKind {
        match self {
            ResponseParts::Response { .. } => PartKind::Response,
            ResponseParts::Chunk { done: true, .. } => PartKind::FinalChunk,
            ResponseParts::Chunk { .. } => PartKind::Chunk,
        }
    }
}

/// Rebuild a [`Request`] from the fields of a `request` message.
///
/// Methods that never carry a body (GET, HEAD) get an empty body regardless of
/// what `body` holds.
pub fn decode_request(
    url: String,
    method: &str,
    headers: &WireHeaders,
    body: Body,
) -> Result<Request, ProtocolViolation> {
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| ProtocolViolation::malformed(format!("invalid method '{method}'")))?;
    let request = Request::new(method, url).with_headers(wire_to_headers(headers));
    if request.allows_body() {
        Ok(request.with_body(body))
    } else {
        Ok(request)
    }
}

/// Rebuild a [`Response`] head from the fields of a `response` message.
pub fn decode_response(
    status: u16,
    status_text: String,
    headers: &WireHeaders,
    body: Body,
) -> Result<Response, ProtocolViolation> {
    let status = StatusCode::from_u16(status)
        .map_err(|_| ProtocolViolation::malformed(format!("invalid status {status}")))?;
    Ok(Response::new(status)
        .with_status_text(status_text)
        .with_headers(wire_to_headers(headers))
        .with_body(body))
}
