use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Strongly typed exchange identifier backed by ULID.
///
/// One id is minted per request/response round trip so log lines from the
/// forwarder and from the worker that served it can be correlated.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ExchangeId(pub ulid::Ulid);

impl ExchangeId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Attempt to parse from a header string; if invalid, generate a new one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<ExchangeId>().ok())
            .unwrap_or_default()
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExchangeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(ExchangeId(id))
    }
}

impl Serialize for ExchangeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExchangeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<ExchangeId>()
            .map_err(|_| serde::de::Error::custom("invalid exchange id"))
    }
}

/// Identity of a worker pool, used as the value side of the membership table.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct PoolId(pub ulid::Ulid);

impl PoolId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PoolId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Process-unique worker identifier. Sequential so log output stays readable.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct WorkerId(pub u64);

impl WorkerId {
    pub fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}
