//! Segment tree for file-system style route ids.
//!
//! Each node represents one path segment. Static children are keyed by their
//! literal text; dynamic, optional and catch-all children are tried in that
//! order, so a lookup is proportional to the path length with backtracking
//! only where parameter segments overlap.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::pattern::{RoutePattern, Segment};
use super::ParamVec;

struct Terminal<T> {
    route_id: Arc<str>,
    value: T,
}

struct RouteNode<T> {
    /// Route stored at this exact depth
    terminal: Option<Terminal<T>>,
    /// Literal segment children
    statics: HashMap<String, RouteNode<T>>,
    /// `[name]` children
    dynamic: Vec<(Arc<str>, RouteNode<T>)>,
    /// `[[name]]` children
    optional: Vec<(Arc<str>, RouteNode<T>)>,
    /// `[...name]` leaf
    catch_all: Option<(Arc<str>, Terminal<T>)>,
    /// `[[...name]]` leaf
    optional_catch_all: Option<(Arc<str>, Terminal<T>)>,
}

impl<T> RouteNode<T> {
    fn new() -> Self {
        Self {
            terminal: None,
            statics: HashMap::new(),
            dynamic: Vec::new(),
            optional: Vec::new(),
            catch_all: None,
            optional_catch_all: None,
        }
    }

    fn child_for<'a>(
        children: &'a mut Vec<(Arc<str>, RouteNode<T>)>,
        name: &Arc<str>,
    ) -> &'a mut RouteNode<T> {
        let idx = match children.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                children.push((Arc::clone(name), RouteNode::new()));
                children.len() - 1
            }
        };
        &mut children[idx].1
    }

    /// Insert a route; returns the terminal it replaced, if any.
    fn insert(&mut self, segments: &[Segment], terminal: Terminal<T>) -> Option<Terminal<T>> {
        let Some((segment, rest)) = segments.split_first() else {
            return self.terminal.replace(terminal);
        };

        match segment {
            Segment::Static(literal) => self
                .statics
                .entry(literal.clone())
                .or_insert_with(RouteNode::new)
                .insert(rest, terminal),
            Segment::Dynamic(name) => {
                Self::child_for(&mut self.dynamic, name).insert(rest, terminal)
            }
            Segment::OptionalDynamic(name) => {
                Self::child_for(&mut self.optional, name).insert(rest, terminal)
            }
            Segment::CatchAll(name) => self
                .catch_all
                .replace((Arc::clone(name), terminal))
                .map(|(_, t)| t),
            Segment::OptionalCatchAll(name) => self
                .optional_catch_all
                .replace((Arc::clone(name), terminal))
                .map(|(_, t)| t),
        }
    }

    fn search<'a>(&'a self, segments: &[&str], params: &mut ParamVec) -> Option<&'a Terminal<T>> {
        let Some((head, rest)) = segments.split_first() else {
            if let Some(terminal) = &self.terminal {
                return Some(terminal);
            }
            // An optional segment may be absent at the end of the path
            for (_, child) in &self.optional {
                if let Some(found) = child.search(segments, params) {
                    return Some(found);
                }
            }
            return self.optional_catch_all.as_ref().map(|(_, t)| t);
        };

        if let Some(child) = self.statics.get(*head) {
            if let Some(found) = child.search(rest, params) {
                return Some(found);
            }
        }

        for (name, child) in self.dynamic.iter().chain(self.optional.iter()) {
            let mark = params.len();
            params.push((Arc::clone(name), (*head).to_string()));
            if let Some(found) = child.search(rest, params) {
                return Some(found);
            }
            // Backtrack: drop the parameter if the subtree did not match
            params.truncate(mark);
        }

        for (_, child) in &self.optional {
            if let Some(found) = child.search(segments, params) {
                return Some(found);
            }
        }

        let rest_joined = || segments.join("/");
        if let Some((name, terminal)) = &self.catch_all {
            params.push((Arc::clone(name), rest_joined()));
            return Some(terminal);
        }
        if let Some((name, terminal)) = &self.optional_catch_all {
            params.push((Arc::clone(name), rest_joined()));
            return Some(terminal);
        }
        None
    }
}

/// Result of matching a path against a [`RouteTable`].
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    /// Normalised id of the matched route
    pub route_id: Arc<str>,
    /// Value stored for the route
    pub value: &'a T,
    /// Parameters in path order
    pub params: ParamVec,
}

impl<T> RouteMatch<'_, T> {
    /// Get a parameter by name (last occurrence wins).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Route table mapping route ids to values (a worker stores its route modules here).
pub struct RouteTable<T> {
    root: RouteNode<T>,
    len: usize,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self {
            root: RouteNode::new(),
            len: 0,
        }
    }

    /// Insert a route. A second route with the same normalised id replaces the first.
    pub fn insert(&mut self, pattern: &RoutePattern, value: T) {
        let terminal = Terminal {
            route_id: Arc::clone(pattern.id()),
            value,
        };
        if self.root.insert(pattern.segments(), terminal).is_some() {
            warn!(route_id = %pattern.id(), "Replaced existing route");
        } else {
            self.len += 1;
        }
    }

    /// Match a request path (no query string) against the table.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_, T>> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = ParamVec::new();
        let terminal = self.root.search(&segments, &mut params)?;
        Some(RouteMatch {
            route_id: Arc::clone(&terminal.route_id),
            value: &terminal.value,
            params,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
