//! Change propagation
//!
//! When a tracked value mutates, [`notify`] walks its owner-link table and
//! signals every live owner. Owners that are themselves tracked re-enter
//! propagation through their own tables, so a signal climbs the ownership
//! graph until it reaches the roots. A [`Wave`] records which owners were
//! already entered, which makes diamonds deliver once and cycles terminate.
//!
//! Nothing here reports an error to the mutating caller. Dead owners are
//! skipped, hook failures are logged and counted, and a busy table aborts
//! the call with a warning.

use crate::error::HookError;
use crate::links::{LinkKey, OwnerLinks};
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default number of owner hook failures tolerated per propagation call
pub const DEFAULT_MAX_FAILURES: usize = 10;

/// Default number of snapshot attempts on a busy owner-link table
pub const DEFAULT_SNAPSHOT_RETRIES: usize = 3;

/// Anything that can hold a tracked value
///
/// Propagation tries the hooks in order: [`changed`](Owner::changed), then
/// [`mark_modified`](Owner::mark_modified), then
/// [`flag_modified`](Owner::flag_modified). Returning
/// [`HookError::Unsupported`] moves on to the next hook; any other error is
/// a delivery failure.
pub trait Owner: Send + Sync {
    /// Owner kind used in diagnostics
    fn kind(&self) -> &str;

    /// Re-enter propagation on this owner
    fn changed(&self, wave: &mut Wave) -> Result<(), HookError> {
        let _ = wave;
        Err(HookError::Unsupported)
    }

    /// Mark the slot `key` of this owner as modified
    ///
    /// This is the hook a host persistence adapter implements.
    fn mark_modified(&self, key: &LinkKey) -> Result<(), HookError> {
        let _ = key;
        Err(HookError::Unsupported)
    }

    /// Mark the whole owner as modified
    fn flag_modified(&self) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }
}

/// A value that knows its owners
pub trait Trackable {
    /// Identity token of this value, created on first use
    fn token(&self) -> Token;

    /// Table of owners holding this value
    fn owner_links(&self) -> &OwnerLinks;

    /// Signal a change of this value to its owners
    fn changed(&self);

    /// Number of live owners
    fn owner_count(&self) -> usize {
        self.owner_links().live_len()
    }
}

/// Propagation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationPolicy {
    /// Stop signalling further owners after this many hook failures
    pub max_failures: usize,

    /// Snapshot attempts before a busy owner-link table is given up on
    pub snapshot_retries: usize,
}

impl Default for PropagationPolicy {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            snapshot_retries: DEFAULT_SNAPSHOT_RETRIES,
        }
    }
}

/// Owners already entered by one propagation
#[derive(Debug, Default)]
pub struct Wave {
    entered: HashSet<usize>,
}

impl Wave {
    /// Start a new propagation
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark owner at `addr` as entered; `false` if it already was
    pub fn enter(&mut self, addr: usize) -> bool {
        self.entered.insert(addr)
    }

    /// Number of owners entered so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.entered.len()
    }

    /// Check if no owner was entered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }
}

/// Outcome of one [`notify`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Owners whose hook accepted the signal
    pub delivered: usize,

    /// Links whose owner resolved as dead
    pub dead: usize,

    /// Owners implementing none of the hooks
    pub unsupported: usize,

    /// Hook failures
    pub failures: usize,

    /// The owner-link table could not be snapshotted
    pub aborted: bool,

    /// Owners were left unsignalled after reaching the failure ceiling
    pub truncated: bool,
}

/// Signal every owner in `links` that the value described by `subject` changed
pub fn notify(
    subject: &str,
    links: &OwnerLinks,
    policy: &PropagationPolicy,
    wave: &mut Wave,
) -> Delivery {
    let mut delivery = Delivery::default();

    let Some(snapshot) = links.snapshot(policy.snapshot_retries) else {
        tracing::warn!(
            subject,
            retries = policy.snapshot_retries,
            "owner-link table busy, change not propagated"
        );
        delivery.aborted = true;
        return delivery;
    };

    for (index, (token, key)) in snapshot.iter().enumerate() {
        if delivery.failures >= policy.max_failures {
            tracing::warn!(
                subject,
                failures = delivery.failures,
                skipped = snapshot.len() - index,
                "failure ceiling reached, remaining owners not signalled"
            );
            delivery.truncated = true;
            break;
        }

        let Some(owner) = token.resolve() else {
            delivery.dead += 1;
            continue;
        };

        match signal(owner.as_ref(), key, wave) {
            Ok(true) => delivery.delivered += 1,
            Ok(false) => delivery.unsupported += 1,
            Err(error) => {
                delivery.failures += 1;
                tracing::error!(
                    subject,
                    owner = owner.kind(),
                    key = %key,
                    %error,
                    "failed to propagate change"
                );
            }
        }
    }

    delivery
}

/// Try the owner's hooks in order; `Ok(false)` if it implements none
fn signal(owner: &dyn Owner, key: &LinkKey, wave: &mut Wave) -> Result<bool, HookError> {
    match owner.changed(wave) {
        Err(HookError::Unsupported) => {}
        other => return other.map(|()| true),
    }
    match owner.mark_modified(key) {
        Err(HookError::Unsupported) => {}
        other => return other.map(|()| true),
    }
    match owner.flag_modified() {
        Err(HookError::Unsupported) => Ok(false),
        other => other.map(|()| true),
    }
}
