use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::error::RegistryError;

static OPTIONAL_CATCH_ALL: Lazy<Regex> = Lazy::new(|| segment_regex(r"^\[\[\.\.\.(\w+)\]\]$"));
static CATCH_ALL: Lazy<Regex> = Lazy::new(|| segment_regex(r"^\[\.\.\.(\w+)\]$"));
static OPTIONAL_DYNAMIC: Lazy<Regex> = Lazy::new(|| segment_regex(r"^\[\[(\w+)\]\]$"));
static DYNAMIC: Lazy<Regex> = Lazy::new(|| segment_regex(r"^\[(\w+)\]$"));

#[allow(clippy::expect_used)]
fn segment_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("segment pattern is a valid regex")
}

/// One segment of a route id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `users`
    Static(String),
    /// `[id]`
    Dynamic(Arc<str>),
    /// `[[id]]`
    OptionalDynamic(Arc<str>),
    /// `[...slug]`, one or more segments
    CatchAll(Arc<str>),
    /// `[[...slug]]`, zero or more segments
    OptionalCatchAll(Arc<str>),
}

impl Segment {
    fn parse(route: &str, raw: &str) -> Result<Self, RegistryError> {
        let capture = |re: &Regex| {
            re.captures(raw)
                .and_then(|c| c.get(1))
                .map(|m| Arc::<str>::from(m.as_str()))
        };

        if let Some(name) = capture(&OPTIONAL_CATCH_ALL) {
            return Ok(Segment::OptionalCatchAll(name));
        }
        if let Some(name) = capture(&CATCH_ALL) {
            return Ok(Segment::CatchAll(name));
        }
        if let Some(name) = capture(&OPTIONAL_DYNAMIC) {
            return Ok(Segment::OptionalDynamic(name));
        }
        if let Some(name) = capture(&DYNAMIC) {
            return Ok(Segment::Dynamic(name));
        }
        if raw.contains('[') || raw.contains(']') {
            return Err(RegistryError::InvalidRoute {
                route: route.to_string(),
                reason: format!("malformed segment '{raw}'"),
            });
        }
        Ok(Segment::Static(raw.to_string()))
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Segment::CatchAll(_) | Segment::OptionalCatchAll(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Static(s) => write!(f, "{s}"),
            Segment::Dynamic(n) => write!(f, "[{n}]"),
            Segment::OptionalDynamic(n) => write!(f, "[[{n}]]"),
            Segment::CatchAll(n) => write!(f, "[...{n}]"),
            Segment::OptionalCatchAll(n) => write!(f, "[[...{n}]]"),
        }
    }
}

/// A parsed, normalised route id such as `/users/[id]/posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    id: Arc<str>,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse a route id. Leading, trailing and repeated slashes are ignored.
    ///
    /// Catch-all segments are only allowed in the last position.
    pub fn parse(route: &str) -> Result<Self, RegistryError> {
        let segments = route
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|raw| Segment::parse(route, raw))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(pos) = segments.iter().position(Segment::is_catch_all) {
            if pos + 1 != segments.len() {
                return Err(RegistryError::InvalidRoute {
                    route: route.to_string(),
                    reason: "catch-all segment must be last".to_string(),
                });
            }
        }

        let id = if segments.is_empty() {
            "/".to_string()
        } else {
            segments.iter().map(|s| format!("/{s}")).collect::<String>()
        };

        Ok(Self {
            id: Arc::from(id),
            segments,
        })
    }

    /// The normalised route id.
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
