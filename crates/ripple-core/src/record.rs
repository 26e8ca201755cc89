//! Tracked records
//!
//! A [`Record`] is a named-field object configured by a [`RecordSchema`].
//! Assigning a field wraps the value and links it to the record; a mutation
//! anywhere below a field reaches the record, which calls its listeners and
//! then propagates to its own owners.
//!
//! ```
//! use ripple_core::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let user = Record::new(RecordSchema::new("user"));
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&hits);
//! user.subscribe(move |_: &Record| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! user.set("tags", Value::list(["a"]));
//! let tags = user.get("tags").unwrap();
//! tags.as_list().unwrap().push("b");
//!
//! assert_eq!(hits.load(Ordering::SeqCst), 2);
//! ```

use crate::batch::BatchState;
use crate::error::{CoerceError, HookError, TrackingError};
use crate::links::{LinkKey, OwnerLinks};
use crate::propagate::{notify, Owner, Trackable, Wave};
use crate::schema::{RecordSchema, Strategy};
use crate::token::{Token, TokenSlot};
use crate::value::{should_notify, Value};
use crate::walker::{self, Walker};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// Host callback run when a record changes
pub trait ChangeListener: Send + Sync {
    /// The record, or something below it, changed
    fn record_changed(&self, record: &Record);
}

impl<F> ChangeListener for F
where
    F: Fn(&Record) + Send + Sync,
{
    fn record_changed(&self, record: &Record) {
        self(record);
    }
}

/// Enumeration of a host object's externally visible fields
pub trait FieldSource {
    /// Field names and values, in declaration order
    fn enumerate_fields(&self) -> Vec<(String, Value)>;
}

impl FieldSource for IndexMap<String, Value> {
    fn enumerate_fields(&self) -> Vec<(String, Value)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl FieldSource for Vec<(String, Value)> {
    fn enumerate_fields(&self) -> Vec<(String, Value)> {
        self.clone()
    }
}

impl FieldSource for [(String, Value)] {
    fn enumerate_fields(&self) -> Vec<(String, Value)> {
        self.to_vec()
    }
}

/// Serialized form of a record
///
/// Values deserialize as raw collections; [`SchemaRegistry::revive`]
/// rebuilds the tracking graph.
///
/// [`SchemaRegistry::revive`]: crate::schema::SchemaRegistry::revive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Name of the record's schema
    pub schema: String,

    /// Externally visible fields
    pub fields: IndexMap<String, Value>,
}

impl FieldSource for RecordSnapshot {
    fn enumerate_fields(&self) -> Vec<(String, Value)> {
        self.fields.enumerate_fields()
    }
}

struct RecordNode {
    schema: Arc<RecordSchema>,
    fields: RwLock<IndexMap<String, Value>>,
    links: OwnerLinks,
    token: TokenSlot,
    batch: BatchState,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    this: Weak<RecordNode>,
}

impl RecordNode {
    fn addr(&self) -> usize {
        (self as *const Self).cast::<()>() as usize
    }

    fn is_internal(&self, name: &str) -> bool {
        self.schema.skip.is_internal(name)
    }

    /// Coerce and wrap a value entering field `name`
    fn adopt(&self, walker: &mut Walker, name: &str, value: Value) -> Value {
        let value = self.coerce(name, value);
        self.wrap(walker, name, value)
    }

    fn wrap(&self, walker: &mut Walker, name: &str, value: Value) -> Value {
        walker.wrap(self, value, 0, LinkKey::field(name))
    }

    /// Lenient coercion: a failure is logged and the raw value kept
    fn coerce(&self, name: &str, value: Value) -> Value {
        match self.try_coerce(name, &value) {
            Ok(Some(record)) => Value::Record(record),
            Ok(None) => value,
            Err(error) => {
                tracing::warn!(
                    schema = %self.schema.name,
                    field = name,
                    %error,
                    "coercion failed, keeping raw value"
                );
                value
            }
        }
    }

    /// Record for a nested-schema field, `None` when no coercion applies
    fn try_coerce(&self, name: &str, value: &Value) -> Result<Option<Record>, CoerceError> {
        let Some(nested) = self.schema.nested(name) else {
            return Ok(None);
        };
        if matches!(value, Value::Null | Value::Record(_)) {
            return Ok(None);
        }
        nested.coercer().coerce(nested, value).map(Some)
    }

    /// Store `wrapped` in `name` if the slot still holds `expected`
    ///
    /// Returns what the slot holds afterwards.
    fn store_if_same(&self, name: &str, expected: &Value, wrapped: Value) -> Option<Value> {
        let mut fields = self.fields.write();
        let slot = fields.get_mut(name)?;
        if slot.same(expected) {
            *slot = wrapped;
        }
        Some(slot.clone())
    }

    /// Unlink `old` unless another field still holds it
    ///
    /// When it is still held, the link is re-keyed to the surviving field.
    fn release(&self, old: &Value) {
        if !old.is_tracked() {
            return;
        }
        let Some(token) = self.token.current() else {
            return;
        };
        let survivor = self
            .fields
            .read()
            .iter()
            .find(|(name, v)| v.same(old) && !self.is_internal(name))
            .map(|(name, _)| name.clone());
        match survivor {
            Some(name) => walker::relink(&token, old, LinkKey::field(name)),
            None => walker::unlink(&token, old),
        }
    }

    /// Wrap every visible field; returns the number of values left raw
    fn scan(&self) -> usize {
        let pending: Vec<(String, Value)> = self
            .fields
            .read()
            .iter()
            .filter(|(name, value)| !value.is_atomic() && !self.is_internal(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut walker = Walker::new(self.schema.limits());
        for (name, value) in pending {
            let wrapped = self.adopt(&mut walker, &name, value.clone());
            if !wrapped.same(&value) {
                self.store_if_same(&name, &value, wrapped);
            }
        }
        walker.untracked()
    }

    fn deliver(&self, wave: &mut Wave) {
        if let Some(node) = self.this.upgrade() {
            let record = Record(node);
            let listeners = self.listeners.read().clone();
            for listener in &listeners {
                listener.record_changed(&record);
            }
        }
        notify(&self.schema.name, &self.links, &self.schema.propagation, wave);
    }

    /// Deliver outside of any propagation already in flight
    fn fire(&self) {
        let mut wave = Wave::new();
        wave.enter(self.addr());
        self.deliver(&mut wave);
    }
}

impl Owner for RecordNode {
    fn kind(&self) -> &str {
        &self.schema.name
    }

    fn changed(&self, wave: &mut Wave) -> Result<(), HookError> {
        if !wave.enter(self.addr()) {
            return Ok(());
        }
        if self.batch.defer() {
            tracing::trace!(schema = %self.schema.name, "change deferred until batch ends");
            return Ok(());
        }
        self.deliver(wave);
        Ok(())
    }
}

impl Trackable for RecordNode {
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
        let _ = Owner::changed(self, &mut Wave::new());
    }
}

/// Shared handle to a tracked record
#[derive(Clone)]
pub struct Record(Arc<RecordNode>);

impl Record {
    /// Create record with no fields
    pub fn new(schema: impl Into<Arc<RecordSchema>>) -> Self {
        Self::with_fields(schema.into(), IndexMap::new())
    }

    fn with_fields(schema: Arc<RecordSchema>, fields: IndexMap<String, Value>) -> Self {
        Self(Arc::new_cyclic(|this| RecordNode {
            schema,
            fields: RwLock::new(fields),
            links: OwnerLinks::new(),
            token: TokenSlot::new(),
            batch: BatchState::new(),
            listeners: RwLock::new(Vec::new()),
            this: this.clone(),
        }))
    }

    /// Build a record from a host object's fields and establish tracking
    ///
    /// No change is signalled.
    ///
    /// # Errors
    /// Returns error if the source enumerates a field name twice
    pub fn from_source<S>(schema: impl Into<Arc<RecordSchema>>, source: &S) -> Result<Self, TrackingError>
    where
        S: FieldSource + ?Sized,
    {
        let mut fields = IndexMap::new();
        for (name, value) in source.enumerate_fields() {
            if fields.contains_key(&name) {
                return Err(TrackingError::DuplicateField { field: name });
            }
            fields.insert(name, value);
        }
        let record = Self::with_fields(schema.into(), fields);
        record.restore_tracking();
        Ok(record)
    }

    /// Field value
    ///
    /// Under the lazy strategy a raw collection is wrapped on first read,
    /// and a tracked value is re-linked if it lost its link to this record.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let node = &self.0;
        let value = node.fields.read().get(name).cloned()?;
        if node.is_internal(name) || value.is_atomic() {
            return Some(value);
        }

        if value.is_raw() {
            let mut walker = Walker::new(node.schema.limits());
            let wrapped = node.adopt(&mut walker, name, value.clone());
            return node.store_if_same(name, &value, wrapped);
        }

        if let Some(child) = value.trackable() {
            let token = node.token();
            if !child.owner_links().contains(&token) {
                tracing::trace!(schema = %node.schema.name, field = name, "re-linking field value");
                child.owner_links().link(token, LinkKey::field(name));
            }
        }
        Some(value)
    }

    /// Assign a field, returning the previous value
    ///
    /// Signals a change unless the new value is the same object as the old
    /// one or an equal scalar. Internal names are stored as given and never
    /// signal. A nested-schema field whose value fails coercion keeps the
    /// raw value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let node = &self.0;
        if node.is_internal(&name) {
            return node.fields.write().insert(name, value.into());
        }

        let mut walker = Walker::new(node.schema.limits());
        let value = node.adopt(&mut walker, &name, value.into());
        self.commit(name, value)
    }

    /// Assign a field, failing instead of keeping a value that does not
    /// coerce to the field's nested schema
    ///
    /// # Errors
    /// Returns [`TrackingError::Coerce`] if coercion fails; the field is left
    /// untouched
    pub fn try_set(
        &self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, TrackingError> {
        let name = name.into();
        let value = value.into();
        let node = &self.0;
        if node.is_internal(&name) {
            return Ok(node.fields.write().insert(name, value));
        }

        let value = match node.try_coerce(&name, &value)? {
            Some(record) => Value::Record(record),
            None => value,
        };
        let mut walker = Walker::new(node.schema.limits());
        let value = node.wrap(&mut walker, &name, value);
        Ok(self.commit(name, value))
    }

    /// Store an adopted value, release the old one and signal
    fn commit(&self, name: String, value: Value) -> Option<Value> {
        let node = &self.0;
        let old = node.fields.write().insert(name, value.clone());

        if let Some(old) = &old {
            node.release(old);
        }
        if should_notify(old.as_ref(), &value) {
            self.changed();
        }
        old
    }

    /// Remove a field, returning its value
    pub fn remove(&self, name: &str) -> Option<Value> {
        let node = &self.0;
        let old = node.fields.write().shift_remove(name)?;
        if !node.is_internal(name) {
            node.release(&old);
            self.changed();
        }
        Some(old)
    }

    /// Visible fields, in declaration order
    #[must_use]
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.0
            .fields
            .read()
            .iter()
            .filter(|(name, _)| !self.0.is_internal(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Visible field names, in declaration order
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.0
            .fields
            .read()
            .keys()
            .filter(|name| !self.0.is_internal(name))
            .cloned()
            .collect()
    }

    /// Schema of this record
    #[must_use]
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.0.schema
    }

    /// Signal a change: listeners first, then owners
    ///
    /// Inside a batch the signal is deferred to the end of the outermost
    /// batch.
    pub fn changed(&self) {
        Trackable::changed(&*self.0);
    }

    /// Open a batch; changes are delivered once when the last guard drops
    #[must_use = "the batch ends when the guard is dropped"]
    pub fn batch_changes(&self) -> BatchGuard {
        self.0.batch.begin();
        BatchGuard {
            record: self.clone(),
        }
    }

    /// Current batch nesting depth
    #[must_use]
    pub fn suppression_depth(&self) -> usize {
        self.0.batch.depth()
    }

    /// Check if a change waits for the batch to end
    #[must_use]
    pub fn has_pending_change(&self) -> bool {
        self.0.batch.pending()
    }

    /// Add a change listener
    pub fn subscribe(&self, listener: impl ChangeListener + 'static) {
        self.0.listeners.write().push(Arc::new(listener));
    }

    /// Register a host owner of this record
    pub fn link_owner(&self, owner: Token, key: LinkKey) {
        self.0.links.link(owner, key);
    }

    /// Remove a host owner; `false` if it was not linked
    pub fn unlink_owner(&self, owner: &Token) -> bool {
        self.0.links.unlink(owner)
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

    /// Rebuild tracking state after reconstruction
    ///
    /// Resets batching, replaces the identity token, forgets all owners, then
    /// wraps the fields (eager) or leaves wrapping to the first read (lazy).
    /// Calling it again is harmless.
    pub fn restore_tracking(&self) {
        let node = &self.0;
        node.batch.reset();
        node.token.reset();
        node.links.clear();

        match node.schema.strategy {
            Strategy::Eager => {
                let untracked = node.scan();
                tracing::debug!(schema = %node.schema.name, untracked, "tracking restored");
            }
            Strategy::Lazy => {
                tracing::debug!(schema = %node.schema.name, "tracking reset, fields wrap on read");
            }
        }
    }

    /// Serializable copy of the visible fields
    #[must_use]
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            schema: self.0.schema.name.clone(),
            fields: self.fields().into_iter().collect(),
        }
    }

    /// Check if both handles are the same record
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        self.0.addr()
    }
}

impl Trackable for Record {
    fn token(&self) -> Token {
        self.0.token()
    }

    fn owner_links(&self) -> &OwnerLinks {
        &self.0.links
    }

    fn changed(&self) {
        Trackable::changed(&*self.0);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("schema", &self.0.schema.name)
            .field("fields", &self.field_names())
            .field("owners", &self.owner_count())
            .finish()
    }
}

/// Open batch on a record
///
/// Dropping the guard closes the batch, including on early return and
/// panic. The outermost guard delivers one signal if anything changed.
#[derive(Debug)]
pub struct BatchGuard {
    record: Record,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let node = &self.record.0;
        if node.batch.end() {
            tracing::debug!(schema = %node.schema.name, "batch closed, delivering change");
            node.fire();
        }
    }
}
