//! Ripple Core
//!
//! Change tracking for shared, possibly cyclic object graphs.
//!
//! # Overview
//!
//! Values assigned into a [`Record`] are wrapped into trackable containers
//! that know who holds them. A mutation anywhere in the graph climbs the
//! owner links and reaches every owner exactly once, and a batch on a record
//! coalesces many writes into one signal.
//!
//! - **Token**: identity of an owner, holding it weakly
//! - **OwnerLinks**: per-value table of owners and the slot they use
//! - **TrackedList / TrackedMap / TrackedSet**: containers that signal on mutation
//! - **Walker**: wraps raw values, closing cycles and sharing diamonds
//! - **notify**: propagation to owners with failure and retry limits
//! - **Record / RecordSchema / SchemaRegistry**: configured host records
//!
//! # Example
//!
//! ```rust
//! use ripple_core::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(RecordSchema::new("team"));
//! let a = Record::new(Arc::clone(&schema));
//! let b = Record::new(schema);
//!
//! let shared = TrackedList::new();
//! a.set("members", shared.clone());
//! b.set("members", shared.clone());
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! for record in [&a, &b] {
//!     let hits = Arc::clone(&hits);
//!     record.subscribe(move |_: &Record| {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     });
//! }
//!
//! shared.push("ada");
//! assert_eq!(hits.load(Ordering::SeqCst), 2);
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod container;
pub mod error;
pub mod links;
pub mod propagate;
pub mod record;
pub mod schema;
pub mod token;
pub mod value;
pub mod walker;

// Re-exports
pub use batch::BatchState;
pub use container::{TrackedList, TrackedMap, TrackedSet};
pub use error::{CoerceError, ConfigError, HookError, TrackingError};
pub use links::{LinkKey, OwnerLinks};
pub use propagate::{notify, Delivery, Owner, PropagationPolicy, Trackable, Wave};
pub use record::{BatchGuard, ChangeListener, FieldSource, Record, RecordSnapshot};
pub use schema::{Coerce, DefaultCoercer, RecordSchema, SchemaRegistry, SkipPolicy, Strategy};
pub use token::{Token, TokenSlot};
pub use value::{should_notify, Key, RawList, RawMap, RawSet, Value};
pub use walker::{DepthOverflow, Limits, Walker};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for tracking records
    pub use crate::{
        ChangeListener, DepthOverflow, HookError, Key, LinkKey, Owner, Record, RecordSchema,
        RecordSnapshot, SchemaRegistry, Strategy, Token, Trackable, TrackedList, TrackedMap,
        TrackedSet, TrackingError, Value,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
