use std::fmt;

use crate::error::ProtocolViolation;
use crate::protocol::PartKind;

/// Where a worker is in its current exchange.
///
/// ```text
/// IDLE → REQUEST_RECEIVED → BODY_CHUNK* → BODY_DONE → DISPATCHING
///      → RESPONSE_SENT → CHUNK* → DONE
/// ```
///
/// Only inbound messages go through [`ExchangeState::accept`]; the outbound
/// half is driven by the dispatcher itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    RequestReceived,
    BodyChunk,
    BodyDone,
    Dispatching,
    ResponseSent,
    Chunk,
    Done,
}

impl ExchangeState {
    /// Next state after receiving `received`, or the violation it represents.
    pub fn accept(self, received: PartKind) -> Result<Self, ProtocolViolation> {
        use ExchangeState::*;
        match (self, received) {
            (Idle | Done, PartKind::Request) => Ok(RequestReceived),
            (RequestReceived | BodyChunk, PartKind::Body) => Ok(BodyChunk),
            (RequestReceived | BodyChunk, PartKind::Done) => Ok(BodyDone),
            (state, received) => Err(ProtocolViolation::unexpected(state, received)),
        }
    }

    /// True while an exchange is open, i.e. there is something to abort.
    pub fn in_exchange(self) -> bool {
        !matches!(self, ExchangeState::Idle | ExchangeState::Done)
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Idle => "IDLE",
            ExchangeState::RequestReceived => "REQUEST_RECEIVED",
            ExchangeState::BodyChunk => "BODY_CHUNK",
            ExchangeState::BodyDone => "BODY_DONE",
            ExchangeState::Dispatching => "DISPATCHING",
            ExchangeState::ResponseSent => "RESPONSE_SENT",
            ExchangeState::Chunk => "CHUNK",
            ExchangeState::Done => "DONE",
        };
        f.write_str(name)
    }
}
