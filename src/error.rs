//! Error types for the pool, protocol, forwarder and configuration layers.
//!
//! Handler failures are not represented here: they are `anyhow` errors that the
//! worker converts into a default 500 response before the response phase.

use std::fmt;
use std::path::PathBuf;

use crate::ids::WorkerId;
use crate::protocol::PartKind;

/// A protocol message arrived out of order, or could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `received` is not a legal successor of the exchange state `state`.
    UnexpectedMessage { state: String, received: PartKind },
    /// A message was in order but its fields were unusable.
    Malformed { reason: String },
}

impl ProtocolViolation {
    pub fn unexpected(state: impl fmt::Display, received: PartKind) -> Self {
        ProtocolViolation::UnexpectedMessage {
            state: state.to_string(),
            received,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolViolation::Malformed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::UnexpectedMessage { state, received } => {
                write!(f, "protocol violation: '{received}' received in state {state}")
            }
            ProtocolViolation::Malformed { reason } => {
                write!(f, "protocol violation: malformed message ({reason})")
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// A worker's router data could not be resolved against the handler registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No module is registered under this path.
    UnknownModule { path: String },
    /// The module exists but is a middleware where a route module was expected.
    NotARouteModule { path: String },
    /// The module exists but is a route module where a middleware was expected.
    NotAMiddleware { path: String },
    /// A route id could not be parsed into a pattern.
    InvalidRoute { route: String, reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownModule { path } => {
                write!(f, "no module registered for '{path}'")
            }
            RegistryError::NotARouteModule { path } => {
                write!(f, "module '{path}' is a middleware, expected a route module")
            }
            RegistryError::NotAMiddleware { path } => {
                write!(f, "module '{path}' is a route module, expected a middleware")
            }
            RegistryError::InvalidRoute { route, reason } => {
                write!(f, "invalid route '{route}': {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Failures of pool construction and worker acquisition.
#[derive(Debug)]
pub enum PoolError {
    /// The pool was configured with an unusable worker count.
    Configuration { reason: String },
    /// The runtime refused to spawn a worker coroutine.
    Spawn { source: std::io::Error },
    /// The router data names a module the registry cannot provide.
    Registry(RegistryError),
    /// The worker exited before reporting whether it started.
    StartupLost { worker: WorkerId },
    /// An acquirer was woken without a worker because the pool went away.
    Closed,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Configuration { reason } => {
                write!(f, "worker pool configuration error: {reason}")
            }
            PoolError::Spawn { source } => write!(f, "failed to spawn worker: {source}"),
            PoolError::Registry(err) => write!(f, "cannot resolve worker routes: {err}"),
            PoolError::StartupLost { worker } => {
                write!(f, "{worker} exited before completing startup")
            }
            PoolError::Closed => write!(f, "worker pool closed"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Spawn { source } => Some(source),
            PoolError::Registry(err) => Some(err),
            _ => None,
        }
    }
}

/// Failures surfaced to callers of [`crate::forwarder::Forwarder::forward`].
#[derive(Debug)]
pub enum ForwardError {
    /// No worker could be acquired.
    Pool(PoolError),
    /// The worker ended the exchange without ever sending a `response`.
    ExchangeIncomplete { worker: WorkerId },
    /// The worker sent messages out of order.
    Protocol {
        worker: WorkerId,
        violation: ProtocolViolation,
    },
    /// The worker's channel closed mid-exchange.
    WorkerUnavailable { worker: WorkerId },
    /// Reading the caller's request body failed mid-transfer.
    RequestBody {
        worker: WorkerId,
        source: anyhow::Error,
    },
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Pool(err) => write!(f, "{err}"),
            ForwardError::ExchangeIncomplete { worker } => {
                write!(f, "exchange incomplete: {worker} finished without a response")
            }
            ForwardError::Protocol { worker, violation } => write!(f, "{worker}: {violation}"),
            ForwardError::WorkerUnavailable { worker } => {
                write!(f, "{worker} stopped responding mid-exchange")
            }
            ForwardError::RequestBody { worker, source } => {
                write!(f, "request body failed while streaming to {worker}: {source}")
            }
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardError::Pool(err) => Some(err),
            ForwardError::Protocol { violation, .. } => Some(violation),
            ForwardError::RequestBody { source, .. } => {
                let err: &(dyn std::error::Error + 'static) = source.as_ref();
                Some(err)
            }
            _ => None,
        }
    }
}

impl From<RegistryError> for PoolError {
    fn from(err: RegistryError) -> Self {
        PoolError::Registry(err)
    }
}

impl From<PoolError> for ForwardError {
    fn from(err: PoolError) -> Self {
        ForwardError::Pool(err)
    }
}

/// Configuration could not be loaded.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        key: String,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: &'static str) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            value: value.into(),
            reason,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "cannot parse config file {}: {source}", path.display())
            }
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "invalid value '{value}' for {key}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}
