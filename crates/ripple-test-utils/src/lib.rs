//! Testing utilities for the Ripple workspace
//!
//! Shared owners, listeners and schema fixtures.

#![allow(missing_docs)]

use parking_lot::Mutex;
use ripple_core::{
    ChangeListener, HookError, LinkKey, Owner, Record, RecordSchema, Token, TokenSlot, Value, Wave,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Install a test subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Listener counting record change signals
#[derive(Debug, Clone, Default)]
pub struct CountingListener {
    hits: Arc<AtomicUsize>,
}

impl CountingListener {
    /// Subscribe a fresh counter to `record`
    pub fn attach(record: &Record) -> Self {
        let listener = Self::default();
        record.subscribe(listener.clone());
        listener
    }

    pub fn count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl ChangeListener for CountingListener {
    fn record_changed(&self, _record: &Record) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Host persistence stand-in: records which columns were marked modified
pub struct DirtyRow {
    marks: Mutex<Vec<String>>,
    token: TokenSlot,
    this: Weak<DirtyRow>,
}

impl DirtyRow {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            marks: Mutex::new(Vec::new()),
            token: TokenSlot::new(),
            this: this.clone(),
        })
    }

    pub fn token(&self) -> Token {
        self.token.get_or_create(|| {
            let owner: Weak<dyn Owner> = self.this.clone();
            owner
        })
    }

    /// Make this row the owner of `record`, stored in `column`
    pub fn attach(&self, column: &str, record: &Record) {
        record.link_owner(self.token(), LinkKey::field(column));
    }

    pub fn marks(&self) -> Vec<String> {
        self.marks.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.marks.lock().len()
    }
}

impl Owner for DirtyRow {
    fn kind(&self) -> &str {
        "row"
    }

    fn mark_modified(&self, key: &LinkKey) -> Result<(), HookError> {
        self.marks.lock().push(key.to_string());
        Ok(())
    }
}

/// Owner whose `changed` hook always fails
#[derive(Default)]
pub struct FailingOwner {
    calls: AtomicUsize,
    token: TokenSlot,
}

impl FailingOwner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Owner for FailingOwner {
    fn kind(&self) -> &str {
        "failing"
    }

    fn changed(&self, _wave: &mut Wave) -> Result<(), HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HookError::rejected("owner is read-only"))
    }
}

/// Owner implementing only the whole-object fallback hook
#[derive(Default)]
pub struct FlagOnlyOwner {
    flags: AtomicUsize,
}

impl FlagOnlyOwner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn flags(&self) -> usize {
        self.flags.load(Ordering::SeqCst)
    }
}

impl Owner for FlagOnlyOwner {
    fn kind(&self) -> &str {
        "flag-only"
    }

    fn flag_modified(&self) -> Result<(), HookError> {
        self.flags.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Token for an owner, created once per owner
pub fn token_of<T: Owner + 'static>(owner: &Arc<T>, slot: &TokenSlot) -> Token {
    slot.get_or_create(|| {
        let owner: Arc<dyn Owner> = owner.clone();
        Arc::downgrade(&owner)
    })
}

/// Token for a [`FailingOwner`]
pub fn failing_token(owner: &Arc<FailingOwner>) -> Token {
    token_of(owner, &owner.token)
}

pub fn user_schema() -> Arc<RecordSchema> {
    Arc::new(RecordSchema::new("user"))
}

pub fn schema_with_depth(max_depth: usize) -> Arc<RecordSchema> {
    Arc::new(RecordSchema::new("deep").with_max_depth(max_depth))
}

/// Raw maps nested `levels` deep under key `next`, with `leaf = 1` at the bottom
pub fn nested_maps(levels: usize) -> Value {
    let mut value = Value::map([("leaf", 1)]);
    for _ in 1..levels {
        value = Value::map([("next", value)]);
    }
    value
}
