//! Trackable containers
//!
//! [`TrackedList`], [`TrackedMap`] and [`TrackedSet`] are shared handles. A
//! container can sit under several owners at once; each mutation wraps the
//! inserted values, drops the links of values it no longer holds, and
//! signals every owner.

use crate::error::{HookError, TrackingError};
use crate::links::{LinkKey, OwnerLinks};
use crate::propagate::{notify, Owner, Trackable, Wave};
use crate::token::{Token, TokenSlot};
use crate::value::{Key, Value};
use crate::walker::{self, Limits, Walker};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Element storage of a container node
pub(crate) trait Collection: Default + Send + Sync + 'static {
    const KIND: &'static str;
}

impl Collection for Vec<Value> {
    const KIND: &'static str = "list";
}

impl Collection for IndexMap<Key, Value> {
    const KIND: &'static str = "map";
}

impl Collection for IndexSet<Key> {
    const KIND: &'static str = "set";
}

pub(crate) struct Node<D> {
    data: RwLock<D>,
    links: OwnerLinks,
    token: TokenSlot,
    depth: usize,
    limits: Limits,
    this: Weak<Node<D>>,
}

impl<D: Collection> Node<D> {
    fn create(depth: usize, limits: Limits) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            data: RwLock::new(D::default()),
            links: OwnerLinks::new(),
            token: TokenSlot::new(),
            depth,
            limits,
            this: this.clone(),
        })
    }

    fn addr(&self) -> usize {
        (self as *const Self).cast::<()>() as usize
    }

    /// Wrap a value entering this container
    fn adopt(&self, value: Value, key: LinkKey) -> Value {
        Walker::new(self.limits).wrap(self, value, self.depth + 1, key)
    }

    fn touch(&self) {
        // Containers have no hooks that can fail
        let _ = Owner::changed(self, &mut Wave::new());
    }

    /// Unlink removed values that are no longer held anywhere in this node
    ///
    /// A value still held elsewhere keeps its link, re-keyed to the slot
    /// `held_at` finds for it.
    fn release(&self, removed: &[Value], held_at: impl Fn(&D, &Value) -> Option<LinkKey>) {
        let Some(token) = self.token.current() else {
            return;
        };
        let data = self.data.read();
        for value in removed.iter().filter(|v| v.is_tracked()) {
            match held_at(&data, value) {
                Some(key) => walker::relink(&token, value, key),
                None => walker::unlink(&token, value),
            }
        }
    }
}

impl<D: Collection> Owner for Node<D> {
    fn kind(&self) -> &str {
        D::KIND
    }

    fn changed(&self, wave: &mut Wave) -> Result<(), HookError> {
        if wave.enter(self.addr()) {
            notify(D::KIND, &self.links, &self.limits.propagation, wave);
        }
        Ok(())
    }
}

impl<D: Collection> Trackable for Node<D> {
    fn token(&self) -> Token {
        self.token.get_or_create(|| {
            let owner: Weak<dyn Owner> = self.this.clone();
            owner
        })
    }

    fn owner_links(&self) -> &OwnerLinks {
        &self.links
    }

    fn changed(&self) {
        self.touch();
    }
}

macro_rules! delegate_trackable {
    ($handle:ty) => {
        impl Trackable for $handle {
            fn token(&self) -> Token {
                self.0.token()
            }

            fn owner_links(&self) -> &OwnerLinks {
                &self.0.links
            }

            fn changed(&self) {
                self.0.touch();
            }
        }
    };
}

/// Tracked sequence
#[derive(Clone)]
pub struct TrackedList(Arc<Node<Vec<Value>>>);

impl TrackedList {
    /// Create empty list at the top of its own graph
    #[must_use]
    pub fn new() -> Self {
        Self::with_depth(0, Limits::default())
    }

    pub(crate) fn with_depth(depth: usize, limits: Limits) -> Self {
        Self(Node::create(depth, limits))
    }

    pub(crate) fn fill(&self, items: Vec<Value>) {
        *self.0.data.write() = items;
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    /// Check if list is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.data.read().get(index).cloned()
    }

    /// Copy of the items
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.data.read().clone()
    }

    /// Append item
    pub fn push(&self, value: impl Into<Value>) {
        let index = self.len();
        let value = self.0.adopt(value.into(), LinkKey::Index(index));
        self.0.data.write().push(value);
        self.0.touch();
    }

    /// Insert item at `index`
    ///
    /// # Errors
    /// Returns error if `index` is past the end of the list
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<(), TrackingError> {
        let len = self.len();
        if index > len {
            return Err(TrackingError::IndexOutOfBounds { index, len });
        }
        let value = self.0.adopt(value.into(), LinkKey::Index(index));
        {
            let mut items = self.0.data.write();
            let len = items.len();
            if index > len {
                return Err(TrackingError::IndexOutOfBounds { index, len });
            }
            items.insert(index, value);
        }
        self.0.touch();
        Ok(())
    }

    /// Replace item at `index`, returning the previous one
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        let value = self.0.adopt(value.into(), LinkKey::Index(index));
        let old = {
            let mut items = self.0.data.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, value)
        };
        self.release(std::slice::from_ref(&old));
        self.0.touch();
        Some(old)
    }

    /// Remove item at `index`
    pub fn remove(&self, index: usize) -> Option<Value> {
        let old = {
            let mut items = self.0.data.write();
            (index < items.len()).then(|| items.remove(index))
        }?;
        self.release(std::slice::from_ref(&old));
        self.0.touch();
        Some(old)
    }

    /// Remove last item
    pub fn pop(&self) -> Option<Value> {
        let old = self.0.data.write().pop()?;
        self.release(std::slice::from_ref(&old));
        self.0.touch();
        Some(old)
    }

    /// Append items, signalling once
    pub fn extend<I, T>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let start = self.len();
        let mut walker = Walker::new(self.0.limits);
        let items: Vec<Value> = items
            .into_iter()
            .enumerate()
            .map(|(offset, item)| {
                walker.wrap(&*self.0, item.into(), self.0.depth + 1, LinkKey::Index(start + offset))
            })
            .collect();
        if items.is_empty() {
            return;
        }
        self.0.data.write().extend(items);
        self.0.touch();
    }

    /// Remove all items
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.0.data.write());
        if old.is_empty() {
            return;
        }
        self.release(&old);
        self.0.touch();
    }

    /// Signal a change to the owners
    pub fn changed(&self) {
        self.0.touch();
    }

    /// Identity token
    #[must_use]
    pub fn token(&self) -> Token {
        self.0.token()
    }

    /// Number of live owners
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.0.links.live_len()
    }

    /// Depth at which the list was created
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Check if both handles are the same list
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        self.0.addr()
    }

    fn release(&self, removed: &[Value]) {
        self.0
            .release(removed, |items, value| {
                items.iter().position(|v| v.same(value)).map(LinkKey::Index)
            });
    }
}

impl Default for TrackedList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedList")
            .field("len", &self.len())
            .field("owners", &self.owner_count())
            .finish()
    }
}

delegate_trackable!(TrackedList);

/// Tracked mapping
#[derive(Clone)]
pub struct TrackedMap(Arc<Node<IndexMap<Key, Value>>>);

impl TrackedMap {
    /// Create empty mapping at the top of its own graph
    #[must_use]
    pub fn new() -> Self {
        Self::with_depth(0, Limits::default())
    }

    pub(crate) fn with_depth(depth: usize, limits: Limits) -> Self {
        Self(Node::create(depth, limits))
    }

    pub(crate) fn fill(&self, entries: IndexMap<Key, Value>) {
        *self.0.data.write() = entries;
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    /// Check if mapping is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value for `key`
    #[must_use]
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        self.0.data.read().get(&key.into()).cloned()
    }

    /// Check if `key` is present
    #[must_use]
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.0.data.read().contains_key(&key.into())
    }

    /// Copy of the keys, in insertion order
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.0.data.read().keys().cloned().collect()
    }

    /// Copy of the entries, in insertion order
    #[must_use]
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.0
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert entry, returning the previous value
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = self.0.adopt(value.into(), LinkKey::Entry(key.clone()));
        let old = self.0.data.write().insert(key, value);
        if let Some(old) = &old {
            self.release(std::slice::from_ref(old));
        }
        self.0.touch();
        old
    }

    /// Remove entry
    pub fn remove(&self, key: impl Into<Key>) -> Option<Value> {
        let old = self.0.data.write().shift_remove(&key.into())?;
        self.release(std::slice::from_ref(&old));
        self.0.touch();
        Some(old)
    }

    /// Insert entries, signalling once
    pub fn extend<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        let mut walker = Walker::new(self.0.limits);
        let entries: Vec<(Key, Value)> = entries
            .into_iter()
            .map(|(k, v)| {
                let k = k.into();
                let v = walker.wrap(&*self.0, v.into(), self.0.depth + 1, LinkKey::Entry(k.clone()));
                (k, v)
            })
            .collect();
        if entries.is_empty() {
            return;
        }
        let replaced: Vec<Value> = {
            let mut data = self.0.data.write();
            entries
                .into_iter()
                .filter_map(|(k, v)| data.insert(k, v))
                .collect()
        };
        self.release(&replaced);
        self.0.touch();
    }

    /// Remove all entries
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.0.data.write());
        if old.is_empty() {
            return;
        }
        let values: Vec<Value> = old.into_values().collect();
        self.release(&values);
        self.0.touch();
    }

    /// Signal a change to the owners
    pub fn changed(&self) {
        self.0.touch();
    }

    /// Identity token
    #[must_use]
    pub fn token(&self) -> Token {
        self.0.token()
    }

    /// Number of live owners
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.0.links.live_len()
    }

    /// Depth at which the mapping was created
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Check if both handles are the same mapping
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        self.0.addr()
    }

    fn release(&self, removed: &[Value]) {
        self.0
            .release(removed, |entries, value| {
                entries
                    .iter()
                    .find(|(_, v)| v.same(value))
                    .map(|(k, _)| LinkKey::Entry(k.clone()))
            });
    }
}

impl Default for TrackedMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedMap")
            .field("len", &self.len())
            .field("owners", &self.owner_count())
            .finish()
    }
}

delegate_trackable!(TrackedMap);

/// Tracked set of keys
///
/// Only signals when membership actually changes.
#[derive(Clone)]
pub struct TrackedSet(Arc<Node<IndexSet<Key>>>);

impl TrackedSet {
    /// Create empty set at the top of its own graph
    #[must_use]
    pub fn new() -> Self {
        Self::with_depth(0, Limits::default())
    }

    pub(crate) fn with_depth(depth: usize, limits: Limits) -> Self {
        Self(Node::create(depth, limits))
    }

    pub(crate) fn fill(&self, members: impl IntoIterator<Item = Key>) {
        *self.0.data.write() = members.into_iter().collect();
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    /// Check if set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.0.data.read().contains(&key.into())
    }

    /// Copy of the members, in insertion order
    #[must_use]
    pub fn to_vec(&self) -> Vec<Key> {
        self.0.data.read().iter().cloned().collect()
    }

    /// Add member; returns whether it was new
    pub fn insert(&self, key: impl Into<Key>) -> bool {
        let added = self.0.data.write().insert(key.into());
        if added {
            self.0.touch();
        }
        added
    }

    /// Remove member; returns whether it was present
    pub fn remove(&self, key: impl Into<Key>) -> bool {
        let removed = self.0.data.write().shift_remove(&key.into());
        if removed {
            self.0.touch();
        }
        removed
    }

    /// Remove all members
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.0.data.write());
        if !old.is_empty() {
            self.0.touch();
        }
    }

    /// Signal a change to the owners
    pub fn changed(&self) {
        self.0.touch();
    }

    /// Identity token
    #[must_use]
    pub fn token(&self) -> Token {
        self.0.token()
    }

    /// Number of live owners
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.0.links.live_len()
    }

    /// Check if both handles are the same set
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        self.0.addr()
    }
}

impl Default for TrackedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedSet")
            .field("len", &self.len())
            .field("owners", &self.owner_count())
            .finish()
    }
}

delegate_trackable!(TrackedSet);
