//! # Router Module
//!
//! File-system style route matching used by each worker's private route table.
//!
//! ## Route ids
//!
//! | Segment        | Matches                          | Parameter value          |
//! |----------------|----------------------------------|--------------------------|
//! | `users`        | the literal segment              |                          |
//! | `[id]`         | exactly one segment              | the segment              |
//! | `[[page]]`     | zero or one segment              | the segment, if present  |
//! | `[...slug]`    | one or more trailing segments    | segments joined by `/`   |
//! | `[[...path]]`  | zero or more trailing segments   | segments joined by `/`   |
//!
//! At every depth candidates are tried in that order, so static routes win
//! over dynamic ones and catch-alls only match what nothing else did.
//!
//! ## Example
//!
//! ```rust
//! use keiro::router::{RoutePattern, RouteTable};
//!
//! let mut table = RouteTable::new();
//! table.insert(&RoutePattern::parse("/users/[id]").unwrap(), "users/[id]");
//! table.insert(&RoutePattern::parse("/users/me").unwrap(), "users/me");
//!
//! let hit = table.lookup("/users/42").unwrap();
//! assert_eq!(*hit.value, "users/[id]");
//! assert_eq!(hit.param("id"), Some("42"));
//! assert_eq!(*table.lookup("/users/me/").unwrap().value, "users/me");
//! ```

mod pattern;
mod table;

use smallvec::SmallVec;
use std::sync::Arc;

pub use pattern::{RoutePattern, Segment};
pub use table::{RouteMatch, RouteTable};

/// Path parameters in match order. Most routes carry few, so they stay inline.
pub type ParamVec = SmallVec<[(Arc<str>, String); 8]>;
