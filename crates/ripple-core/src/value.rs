//! Dynamic values stored in records and containers
//!
//! [`Value`] covers three families:
//! - Atomic scalars, which are never wrapped
//! - Raw collections ([`RawList`], [`RawMap`], [`RawSet`]): shared, untracked
//!   handles with identity, as produced by deserialization or host code
//! - Tracked values ([`TrackedList`], [`TrackedMap`], [`TrackedSet`],
//!   [`Record`]) that know their owners and signal mutations

use crate::container::{TrackedList, TrackedMap, TrackedSet};
use crate::propagate::Trackable;
use crate::record::Record;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Hashable scalar used as map key and set member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Boolean key
    Bool(bool),
    /// Integer key
    Int(i64),
    /// Text key
    Text(String),
    /// Byte-string key
    Bytes(Vec<u8>),
}

impl Key {
    /// Key for a scalar value, if it has one
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            Value::Bytes(b) => Some(Self::Bytes(b.clone())),
            _ => None,
        }
    }

    /// Text content, if this is a text key
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Untracked shared sequence
#[derive(Clone, Default)]
pub struct RawList(Arc<RwLock<Vec<Value>>>);

impl RawList {
    /// Create empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create list from items
    pub fn from_values<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self(Arc::new(RwLock::new(items.into_iter().map(Into::into).collect())))
    }

    /// Append item
    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    /// Replace item at `index`, returning the previous one
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let mut items = self.0.write();
        let slot = items.get_mut(index)?;
        Some(std::mem::replace(slot, value.into()))
    }

    /// Item at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Check if list is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all items
    pub fn clear(&self) {
        self.0.write().clear();
    }

    /// Copy of the items
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Check if both handles are the same list
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for RawList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawList").field("len", &self.len()).finish()
    }
}

/// Untracked shared mapping
#[derive(Clone, Default)]
pub struct RawMap(Arc<RwLock<IndexMap<Key, Value>>>);

impl RawMap {
    /// Create empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create mapping from entries
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Self(Arc::new(RwLock::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )))
    }

    /// Insert entry, returning the previous value
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.0.write().insert(key.into(), value.into())
    }

    /// Value for `key`
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    /// Remove entry
    pub fn remove(&self, key: &Key) -> Option<Value> {
        self.0.write().shift_remove(key)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Check if mapping is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.0.write().clear();
    }

    /// Copy of the entries, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Key, Value)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Check if both handles are the same mapping
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for RawMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMap").field("len", &self.len()).finish()
    }
}

/// Untracked shared set of keys
#[derive(Clone, Default)]
pub struct RawSet(Arc<RwLock<IndexSet<Key>>>);

impl RawSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create set from members
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self(Arc::new(RwLock::new(keys.into_iter().map(Into::into).collect())))
    }

    /// Add member; returns whether it was new
    pub fn insert(&self, key: impl Into<Key>) -> bool {
        self.0.write().insert(key.into())
    }

    /// Check membership
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.0.read().contains(key)
    }

    /// Remove member; returns whether it was present
    pub fn remove(&self, key: &Key) -> bool {
        self.0.write().shift_remove(key)
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Check if set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the members, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Key> {
        self.0.read().iter().cloned().collect()
    }

    /// Check if both handles are the same set
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for RawSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSet").field("len", &self.len()).finish()
    }
}

/// Value stored in a record field or container slot
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
    /// Immutable byte string
    Bytes(Vec<u8>),
    /// Untracked sequence
    RawList(RawList),
    /// Untracked mapping
    RawMap(RawMap),
    /// Untracked set
    RawSet(RawSet),
    /// Tracked sequence
    List(TrackedList),
    /// Tracked mapping
    Map(TrackedMap),
    /// Tracked set
    Set(TrackedSet),
    /// Tracked record
    Record(Record),
}

impl Value {
    /// Raw list value from items
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::RawList(RawList::from_values(items))
    }

    /// Raw mapping value from entries
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Self::RawMap(RawMap::from_entries(entries))
    }

    /// Raw set value from members
    pub fn set<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::RawSet(RawSet::from_keys(keys))
    }

    /// Short name of the variant, for diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::RawList(_) => "raw list",
            Self::RawMap(_) => "raw map",
            Self::RawSet(_) => "raw set",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
            Self::Record(_) => "record",
        }
    }

    /// Check if value is an atomic scalar
    #[must_use]
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Bool(_)
                | Self::Int(_)
                | Self::Float(_)
                | Self::Text(_)
                | Self::Bytes(_)
        )
    }

    /// Check if value is an untracked collection
    #[must_use]
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::RawList(_) | Self::RawMap(_) | Self::RawSet(_))
    }

    /// Check if value knows its owners
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Map(_) | Self::Set(_) | Self::Record(_)
        )
    }

    /// Check if value is a collection, raw or tracked
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::RawList(_)
                | Self::RawMap(_)
                | Self::RawSet(_)
                | Self::List(_)
                | Self::Map(_)
                | Self::Set(_)
        )
    }

    /// Identity comparison
    ///
    /// Reference variants compare by pointer. Scalars have no identity and
    /// are never `same`, even when equal.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self.addr(), other.addr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn addr(&self) -> Option<usize> {
        match self {
            Self::RawList(l) => Some(l.addr()),
            Self::RawMap(m) => Some(m.addr()),
            Self::RawSet(s) => Some(s.addr()),
            Self::List(l) => Some(l.addr()),
            Self::Map(m) => Some(m.addr()),
            Self::Set(s) => Some(s.addr()),
            Self::Record(r) => Some(r.addr()),
            _ => None,
        }
    }

    pub(crate) fn trackable(&self) -> Option<&dyn Trackable> {
        match self {
            Self::List(l) => Some(l),
            Self::Map(m) => Some(m),
            Self::Set(s) => Some(s),
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Boolean content
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float content
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Text content
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Tracked list
    #[must_use]
    pub fn as_list(&self) -> Option<&TrackedList> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Tracked mapping
    #[must_use]
    pub fn as_map(&self) -> Option<&TrackedMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Tracked set
    #[must_use]
    pub fn as_set(&self) -> Option<&TrackedSet> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Record
    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Raw list
    #[must_use]
    pub fn as_raw_list(&self) -> Option<&RawList> {
        match self {
            Self::RawList(l) => Some(l),
            _ => None,
        }
    }

    /// Raw mapping
    #[must_use]
    pub fn as_raw_map(&self) -> Option<&RawMap> {
        match self {
            Self::RawMap(m) => Some(m),
            _ => None,
        }
    }

    /// Raw set
    #[must_use]
    pub fn as_raw_set(&self) -> Option<&RawSet> {
        match self {
            Self::RawSet(s) => Some(s),
            _ => None,
        }
    }

    fn seq_items(&self) -> Option<Vec<Value>> {
        match self {
            Self::RawList(l) => Some(l.snapshot()),
            Self::List(l) => Some(l.to_vec()),
            _ => None,
        }
    }

    fn map_entries(&self) -> Option<Vec<(Key, Value)>> {
        match self {
            Self::RawMap(m) => Some(m.snapshot()),
            Self::Map(m) => Some(m.entries()),
            _ => None,
        }
    }

    fn set_members(&self) -> Option<Vec<Key>> {
        match self {
            Self::RawSet(s) => Some(s.snapshot()),
            Self::Set(s) => Some(s.to_vec()),
            _ => None,
        }
    }
}

/// Structural equality
///
/// Identical handles are equal without looking inside. Cycles compare
/// coinductively: a pair of containers met again while already under
/// comparison counts as equal, so `a = [a]` equals `b = [b]`. Raw and
/// tracked collections with equal contents are equal. Records compare by
/// identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_in(other, &mut HashSet::new())
    }
}

impl Value {
    fn eq_in(&self, other: &Self, visiting: &mut HashSet<(usize, usize)>) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => return true,
            (Self::Bool(a), Self::Bool(b)) => return a == b,
            (Self::Int(a), Self::Int(b)) => return a == b,
            (Self::Float(a), Self::Float(b)) => return a == b,
            (Self::Text(a), Self::Text(b)) => return a == b,
            (Self::Bytes(a), Self::Bytes(b)) => return a == b,
            (Self::Record(a), Self::Record(b)) => return a.ptr_eq(b),
            _ if self.same(other) => return true,
            _ => {}
        }
        let (Some(a_addr), Some(b_addr)) = (self.addr(), other.addr()) else {
            return false;
        };
        if !visiting.insert((a_addr, b_addr)) {
            return true;
        }

        if let (Some(a), Some(b)) = (self.seq_items(), other.seq_items()) {
            return a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.eq_in(y, visiting));
        }
        if let (Some(a), Some(b)) = (self.map_entries(), other.map_entries()) {
            let b: IndexMap<Key, Value> = b.into_iter().collect();
            return a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.eq_in(w, visiting)));
        }
        if let (Some(a), Some(b)) = (self.set_members(), other.set_members()) {
            let a: IndexSet<Key> = a.into_iter().collect();
            let b: IndexSet<Key> = b.into_iter().collect();
            return a == b;
        }
        false
    }
}

/// Decide whether assigning `new` over `old` is a real change
///
/// - No previous value: changed
/// - Same object: unchanged
/// - Previous value is a collection: changed, without comparing contents
/// - Otherwise value equality; values that are not equal to themselves
///   (NaN) count as changed
#[must_use]
pub fn should_notify(old: Option<&Value>, new: &Value) -> bool {
    let Some(old) = old else {
        return true;
    };
    if old.same(new) {
        return false;
    }
    if old.is_container() {
        return true;
    }
    old != new
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::RawList(RawList::from_values(items))
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Bool(b) => Self::Bool(b),
            Key::Int(i) => Self::Int(i),
            Key::Text(s) => Self::Text(s),
            Key::Bytes(b) => Self::Bytes(b),
        }
    }
}

impl From<RawList> for Value {
    fn from(l: RawList) -> Self {
        Self::RawList(l)
    }
}

impl From<RawMap> for Value {
    fn from(m: RawMap) -> Self {
        Self::RawMap(m)
    }
}

impl From<RawSet> for Value {
    fn from(s: RawSet) -> Self {
        Self::RawSet(s)
    }
}

impl From<TrackedList> for Value {
    fn from(l: TrackedList) -> Self {
        Self::List(l)
    }
}

impl From<TrackedMap> for Value {
    fn from(m: TrackedMap) -> Self {
        Self::Map(m)
    }
}

impl From<TrackedSet> for Value {
    fn from(s: TrackedSet) -> Self {
        Self::Set(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Self::Record(r)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ancestors = RefCell::new(HashSet::new());
        Tree { value: self, ancestors: &ancestors }.serialize(serializer)
    }
}

/// Value being serialized, with the containers on the path above it
///
/// A container that is its own ancestor fails with a "cyclic value" error.
/// Shared but acyclic containers serialize once per path.
struct Tree<'a> {
    value: &'a Value,
    ancestors: &'a RefCell<HashSet<usize>>,
}

impl Tree<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Tree<'b> {
        Tree { value, ancestors: self.ancestors }
    }

    fn seq<S: Serializer>(&self, serializer: S, items: &[Value]) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|item| self.child(item)))
    }

    fn map<S: Serializer, K: Serialize>(
        &self,
        serializer: S,
        entries: &[(K, Value)],
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(entries.iter().map(|(k, v)| (k, self.child(v))))
    }
}

impl Serialize for Tree<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let addr = self.value.addr();
        if let Some(addr) = addr {
            if !self.ancestors.borrow_mut().insert(addr) {
                return Err(ser::Error::custom("cyclic value"));
            }
        }
        let result = match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::RawList(l) => self.seq(serializer, &l.snapshot()),
            Value::List(l) => self.seq(serializer, &l.to_vec()),
            Value::RawMap(m) => self.map(serializer, &m.snapshot()),
            Value::Map(m) => self.map(serializer, &m.entries()),
            Value::RawSet(s) => serializer.collect_seq(s.snapshot()),
            Value::Set(s) => serializer.collect_seq(s.to_vec()),
            Value::Record(r) => self.map(serializer, &r.fields()),
        };
        if let Some(addr) = addr {
            self.ancestors.borrow_mut().remove(&addr);
        }
        result
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_bytes(b),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar, sequence or mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Value, E> {
        Ok(Value::Int(i))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Value, E> {
        Ok(i64::try_from(u).map_or(Value::Float(u as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<Value, E> {
        Ok(Value::Float(x))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::Text(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::Text(s))
    }

    fn visit_bytes<E: de::Error>(self, b: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(b.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, b: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(b))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::RawList(RawList::from_values(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = IndexMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<Key, Value>()? {
            entries.insert(key, value);
        }
        Ok(Value::RawMap(RawMap(Arc::new(RwLock::new(entries)))))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct KeyVisitor;

impl<'de> Visitor<'de> for KeyVisitor {
    type Value = Key;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a bool, integer, string or byte string key")
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Key, E> {
        Ok(Key::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, i: i64) -> Result<Key, E> {
        Ok(Key::Int(i))
    }

    fn visit_u64<E: de::Error>(self, u: u64) -> Result<Key, E> {
        i64::try_from(u)
            .map(Key::Int)
            .map_err(|_| E::custom(format!("integer key {u} out of range")))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Key, E> {
        Ok(Key::Text(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Key, E> {
        Ok(Key::Text(s))
    }

    fn visit_bytes<E: de::Error>(self, b: &[u8]) -> Result<Key, E> {
        Ok(Key::Bytes(b.to_vec()))
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(KeyVisitor)
    }
}
