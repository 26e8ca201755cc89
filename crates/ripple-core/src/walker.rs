//! Graph walker
//!
//! Turns raw values into tracked ones and links them to their owner.
//!
//! One [`Walker`] is one traversal. It remembers every raw collection it has
//! already converted, keyed by the raw value's address, so that:
//! - a cycle closes on the second visit instead of recursing forever
//! - a value reachable twice (diamond) yields one tracked instance with one
//!   owner link per distinct owner
//!
//! Already tracked values are linked and returned as they are, without
//! looking inside. Raw values nested deeper than the ceiling stay raw.

use crate::container::{TrackedList, TrackedMap, TrackedSet};
use crate::links::LinkKey;
use crate::propagate::{PropagationPolicy, Trackable};
use crate::token::Token;
use crate::value::{RawList, RawMap, RawSet, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default depth ceiling
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Reporting when a value is left raw because of the depth ceiling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthOverflow {
    /// Leave it raw without notice beyond a trace event
    #[default]
    Silent,

    /// Leave it raw and log a warning
    Warn,
}

/// Limits a traversal runs under
///
/// Containers created by a traversal keep these limits and use them when
/// wrapping values inserted later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Deepest depth at which raw collections are still wrapped
    pub max_depth: usize,

    /// What to do past the ceiling
    pub overflow: DepthOverflow,

    /// Propagation limits of created containers
    pub propagation: PropagationPolicy,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            overflow: DepthOverflow::Silent,
            propagation: PropagationPolicy::default(),
        }
    }
}

/// One wrapping traversal
#[derive(Debug)]
pub struct Walker {
    limits: Limits,
    visited: HashMap<usize, Value>,
    untracked: usize,
}

impl Walker {
    /// Start a traversal
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            visited: HashMap::new(),
            untracked: 0,
        }
    }

    /// Limits of this traversal
    #[inline]
    #[must_use]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Number of raw collections left untracked by the depth ceiling
    #[inline]
    #[must_use]
    pub fn untracked(&self) -> usize {
        self.untracked
    }

    /// Wrap `value`, stored in `owner` under `key` at `depth`
    ///
    /// Atomic values come back unchanged. Tracked values come back unchanged
    /// and linked to `owner`. Raw collections come back tracked and linked,
    /// unless `depth` exceeds the ceiling.
    pub fn wrap(&mut self, owner: &dyn Trackable, value: Value, depth: usize, key: LinkKey) -> Value {
        if value.is_atomic() {
            return value;
        }
        if value.is_tracked() {
            link(owner, &value, key);
            return value;
        }

        if let Some(addr) = value.addr() {
            if let Some(seen) = self.visited.get(&addr) {
                let seen = seen.clone();
                tracing::trace!(depth, key = %key, "revisited value, linking existing wrapper");
                link(owner, &seen, key);
                return seen;
            }
        }

        if depth > self.limits.max_depth {
            self.report_overflow(depth, value.kind_name());
            return value;
        }

        match value {
            Value::RawList(raw) => self.wrap_list(owner, &raw, depth, key),
            Value::RawMap(raw) => self.wrap_map(owner, &raw, depth, key),
            Value::RawSet(raw) => self.wrap_set(owner, &raw, depth, key),
            other => other,
        }
    }

    fn wrap_list(&mut self, owner: &dyn Trackable, raw: &RawList, depth: usize, key: LinkKey) -> Value {
        let list = TrackedList::with_depth(depth, self.limits);
        let wrapped = Value::List(list.clone());
        self.visited.insert(raw.addr(), wrapped.clone());
        link(owner, &wrapped, key);

        let items = raw
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(index, item)| self.wrap(&list, item, depth + 1, LinkKey::Index(index)))
            .collect();
        list.fill(items);

        wrapped
    }

    fn wrap_map(&mut self, owner: &dyn Trackable, raw: &RawMap, depth: usize, key: LinkKey) -> Value {
        let map = TrackedMap::with_depth(depth, self.limits);
        let wrapped = Value::Map(map.clone());
        self.visited.insert(raw.addr(), wrapped.clone());
        link(owner, &wrapped, key);

        let entries = raw
            .snapshot()
            .into_iter()
            .map(|(k, v)| {
                let v = self.wrap(&map, v, depth + 1, LinkKey::Entry(k.clone()));
                (k, v)
            })
            .collect();
        map.fill(entries);

        wrapped
    }

    fn wrap_set(&mut self, owner: &dyn Trackable, raw: &RawSet, depth: usize, key: LinkKey) -> Value {
        // Set members are keys, so there is nothing below a set to wrap
        let set = TrackedSet::with_depth(depth, self.limits);
        set.fill(raw.snapshot());
        let wrapped = Value::Set(set);
        self.visited.insert(raw.addr(), wrapped.clone());
        link(owner, &wrapped, key);
        wrapped
    }

    fn report_overflow(&mut self, depth: usize, kind: &'static str) {
        self.untracked += 1;
        let max_depth = self.limits.max_depth;
        match self.limits.overflow {
            DepthOverflow::Silent => {
                tracing::trace!(depth, max_depth, kind, "depth ceiling reached, value left untracked");
            }
            DepthOverflow::Warn => {
                tracing::warn!(depth, max_depth, kind, "depth ceiling reached, value left untracked");
            }
        }
    }
}

/// Link a tracked `child` to `owner` under `key`; no-op for other values
pub(crate) fn link(owner: &dyn Trackable, child: &Value, key: LinkKey) {
    if let Some(child) = child.trackable() {
        child.owner_links().link(owner.token(), key);
    }
}

/// Point `owner`'s link on a tracked `child` at `key`
pub(crate) fn relink(owner: &Token, child: &Value, key: LinkKey) {
    if let Some(child) = child.trackable() {
        child.owner_links().link(owner.clone(), key);
    }
}

/// Remove `owner` from a tracked `child`'s owners
pub(crate) fn unlink(owner: &Token, child: &Value) {
    if let Some(child) = child.trackable() {
        child.owner_links().unlink(owner);
    }
}
