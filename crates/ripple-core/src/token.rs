//! Identity tokens
//!
//! A [`Token`] is the stand-in for an owner inside owner-link tables. It is
//! hashed and compared by its own allocation, so owners whose values compare
//! equal (or that have no meaningful equality at all) still get distinct
//! entries. The owner is held weakly: a token never keeps its owner alive.

use crate::propagate::Owner;
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Hashable, identity-compared weak handle to an owner
#[derive(Clone)]
pub struct Token(Arc<TokenInner>);

struct TokenInner {
    owner: Weak<dyn Owner>,
    revoked: AtomicBool,
}

impl Token {
    /// Create token for owner
    ///
    /// Owners normally go through [`TokenSlot::get_or_create`] instead, which
    /// keeps creation idempotent.
    #[must_use]
    pub fn new(owner: Weak<dyn Owner>) -> Self {
        Self(Arc::new(TokenInner {
            owner,
            revoked: AtomicBool::new(false),
        }))
    }

    /// Resolve to the owner
    ///
    /// Returns `None` when the owner was dropped or the token was revoked.
    #[must_use]
    pub fn resolve(&self) -> Option<Arc<dyn Owner>> {
        if self.0.revoked.load(Ordering::Acquire) {
            return None;
        }
        self.0.owner.upgrade()
    }

    /// Check if the token still resolves
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.0.revoked.load(Ordering::Acquire) && self.0.owner.strong_count() > 0
    }

    /// Permanently detach the token from its owner
    pub fn revoke(&self) {
        self.0.revoked.store(true, Ordering::Release);
    }

    /// Check if two tokens are the same token
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Lazily created token, stored strongly on its owner
#[derive(Default)]
pub struct TokenSlot {
    slot: Mutex<Option<Token>>,
}

impl TokenSlot {
    /// Create empty slot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the owner's token, creating it on first use
    ///
    /// Concurrent first calls agree on a single token. `owner` only builds
    /// the weak reference and must not call back into tracking code.
    pub fn get_or_create(&self, owner: impl FnOnce() -> Weak<dyn Owner>) -> Token {
        let mut slot = self.slot.lock();
        slot.get_or_insert_with(|| Token::new(owner())).clone()
    }

    /// Current token, if one was ever created
    #[must_use]
    pub fn current(&self) -> Option<Token> {
        self.slot.lock().clone()
    }

    /// Revoke and forget the current token
    ///
    /// Links made under the old token resolve as dead from now on; the next
    /// [`get_or_create`](Self::get_or_create) hands out a fresh one.
    pub fn reset(&self) {
        if let Some(old) = self.slot.lock().take() {
            old.revoke();
        }
    }
}

impl fmt::Debug for TokenSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenSlot").field(&self.current()).finish()
    }
}
