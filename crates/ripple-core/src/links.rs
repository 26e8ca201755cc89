//! Owner-link tables
//!
//! Every trackable value keeps an [`OwnerLinks`] table: which owners hold it
//! and under which key. Owners are referenced through [`Token`]s, so a table
//! never keeps an owner alive. Entries whose owner died are skipped by
//! snapshots and swept out once the table has grown.

use crate::token::Token;
use crate::value::Key;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Address of a value inside its owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkKey {
    /// Record field name
    Field(String),

    /// Sequence position at link time
    Index(usize),

    /// Mapping key
    Entry(Key),

    /// Slot without an address (set members)
    None,
}

impl LinkKey {
    /// Create field key
    #[inline]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Entry(key) => write!(f, "[{key}]"),
            Self::None => f.write_str("<none>"),
        }
    }
}

/// Table size at which a link first sweeps out dead entries
const MIN_PRUNE_AT: usize = 8;

/// How long one snapshot attempt waits for a structural writer
const SNAPSHOT_WAIT: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Table {
    entries: HashMap<Token, LinkKey>,
    prune_at: usize,
}

impl Table {
    /// Sweep dead entries once the table has grown past the last sweep
    fn maybe_prune(&mut self) {
        if self.entries.len() < self.prune_at.max(MIN_PRUNE_AT) {
            return;
        }
        self.entries.retain(|token, _| token.is_alive());
        self.prune_at = self.entries.len() * 2;
    }
}

/// Owner token -> key table of one trackable value
#[derive(Default)]
pub struct OwnerLinks {
    table: RwLock<Table>,
}

impl OwnerLinks {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `owner` holds this value under `key`
    ///
    /// Re-linking an existing owner replaces its key. Dead entries are swept
    /// when the table has doubled since the last sweep, so a link costs
    /// amortized O(1).
    pub fn link(&self, owner: Token, key: LinkKey) {
        let mut table = self.table.write();
        table.maybe_prune();
        table.entries.insert(owner, key);
    }

    /// Remove `owner`; returns whether it was linked
    pub fn unlink(&self, owner: &Token) -> bool {
        self.table.write().entries.remove(owner).is_some()
    }

    /// Check if `owner` is linked under any key
    #[must_use]
    pub fn contains(&self, owner: &Token) -> bool {
        self.table.read().entries.contains_key(owner)
    }

    /// Key under which `owner` holds this value
    #[must_use]
    pub fn key_of(&self, owner: &Token) -> Option<LinkKey> {
        self.table.read().entries.get(owner).cloned()
    }

    /// Number of entries, including not yet pruned dead ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    /// Check if the table has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries whose owner is still alive
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.table.read().entries.keys().filter(|t| t.is_alive()).count()
    }

    /// Drop every entry
    pub fn clear(&self) {
        *self.table.write() = Table::default();
    }

    /// Copy the live entries for iteration outside the lock
    ///
    /// Each of the `retries` attempts waits up to a bounded time for a
    /// structural writer to finish. Writers never call out of the table, so
    /// `None` only happens when the table is held far longer than any
    /// link or unlink takes; the caller should then give up.
    #[must_use]
    pub fn snapshot(&self, retries: usize) -> Option<Vec<(Token, LinkKey)>> {
        for attempt in 0..retries.max(1) {
            if let Some(table) = self.table.try_read_for(SNAPSHOT_WAIT) {
                return Some(
                    table
                        .entries
                        .iter()
                        .filter(|(token, _)| token.is_alive())
                        .map(|(token, key)| (token.clone(), key.clone()))
                        .collect(),
                );
            }
            tracing::trace!(attempt, "owner-link table busy, retrying snapshot");
        }
        None
    }
}

impl fmt::Debug for OwnerLinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerLinks")
            .field("len", &self.len())
            .field("live", &self.live_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::Owner;
    use std::sync::Arc;

    struct Holder;

    impl Owner for Holder {
        fn kind(&self) -> &str {
            "holder"
        }
    }

    fn owner_and_token() -> (Arc<dyn Owner>, Token) {
        let owner: Arc<dyn Owner> = Arc::new(Holder);
        let token = Token::new(Arc::downgrade(&owner));
        (owner, token)
    }

    #[test]
    fn link_and_relink_replaces_key() {
        let links = OwnerLinks::new();
        let (_owner, token) = owner_and_token();

        links.link(token.clone(), LinkKey::field("a"));
        links.link(token.clone(), LinkKey::field("b"));

        assert_eq!(links.len(), 1);
        assert_eq!(links.key_of(&token), Some(LinkKey::field("b")));
    }

    #[test]
    fn multiple_owners() {
        let links = OwnerLinks::new();
        let (_a, ta) = owner_and_token();
        let (_b, tb) = owner_and_token();

        links.link(ta.clone(), LinkKey::Index(0));
        links.link(tb.clone(), LinkKey::Index(1));

        let snapshot = links.snapshot(3).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(links.contains(&ta));
        assert!(links.unlink(&tb));
        assert!(!links.unlink(&tb));
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn dead_owner_skipped_then_pruned() {
        let links = OwnerLinks::new();
        let (owner, token) = owner_and_token();
        links.link(token, LinkKey::field("x"));
        drop(owner);

        assert_eq!(links.len(), 1);
        assert_eq!(links.live_len(), 0);
        assert!(links.snapshot(3).unwrap().is_empty());

        for i in 1..MIN_PRUNE_AT {
            let (dead, token) = owner_and_token();
            links.link(token, LinkKey::Index(i));
            drop(dead);
        }
        assert_eq!(links.len(), MIN_PRUNE_AT);

        let (_other, other_token) = owner_and_token();
        links.link(other_token, LinkKey::field("y"));
        assert_eq!(links.len(), 1);
        assert_eq!(links.live_len(), 1);
    }

    #[test]
    fn snapshot_waits_out_a_short_writer() {
        let links = OwnerLinks::new();
        let (_owner, token) = owner_and_token();
        links.link(token, LinkKey::None);

        std::thread::scope(|scope| {
            let guard = links.table.write();
            let reader = scope.spawn(|| links.snapshot(1));
            std::thread::sleep(Duration::from_millis(5));
            drop(guard);
            assert_eq!(reader.join().unwrap().map(|s| s.len()), Some(1));
        });
    }

    #[test]
    fn snapshot_gives_up_while_writer_holds_table() {
        let links = OwnerLinks::new();
        let (_owner, token) = owner_and_token();
        links.link(token, LinkKey::None);

        let guard = links.table.write();
        assert!(links.snapshot(3).is_none());
        drop(guard);

        assert_eq!(links.snapshot(3).unwrap().len(), 1);
    }

    #[test]
    fn link_key_display() {
        assert_eq!(LinkKey::field("tags").to_string(), ".tags");
        assert_eq!(LinkKey::Index(2).to_string(), "[2]");
        assert_eq!(LinkKey::Entry(Key::from("k")).to_string(), "[\"k\"]");
        assert_eq!(LinkKey::None.to_string(), "<none>");
    }
}
