//! Change suppression and batching
//!
//! A record inside a batch does not deliver signals. It remembers that a
//! change happened and delivers exactly once when the outermost batch ends.

use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    depth: usize,
    pending: bool,
}

/// Suppression depth and pending-change flag of one record
#[derive(Debug, Default)]
pub struct BatchState {
    inner: Mutex<Counters>,
}

impl BatchState {
    /// Create state with no active batch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a batch
    pub fn begin(&self) {
        self.inner.lock().depth += 1;
    }

    /// Record a change; `true` if it must wait for the batch to end
    pub fn defer(&self) -> bool {
        let mut counters = self.inner.lock();
        if counters.depth > 0 {
            counters.pending = true;
            true
        } else {
            false
        }
    }

    /// Leave a batch; `true` if the caller must now deliver one signal
    pub fn end(&self) -> bool {
        let mut counters = self.inner.lock();
        counters.depth = counters.depth.saturating_sub(1);
        if counters.depth == 0 && counters.pending {
            counters.pending = false;
            true
        } else {
            false
        }
    }

    /// Forget any active batch and pending change
    pub fn reset(&self) {
        *self.inner.lock() = Counters::default();
    }

    /// Current nesting depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.lock().depth
    }

    /// Check if a change is waiting for the batch to end
    #[must_use]
    pub fn pending(&self) -> bool {
        self.inner.lock().pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_batch_does_not_defer() {
        let state = BatchState::new();
        assert!(!state.defer());
        assert!(!state.pending());
    }

    #[test]
    fn batch_defers_and_delivers_once() {
        let state = BatchState::new();
        state.begin();
        assert!(state.defer());
        assert!(state.defer());
        assert!(state.end());
        assert!(!state.pending());
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn nested_batch_delivers_at_outermost_end() {
        let state = BatchState::new();
        state.begin();
        state.begin();
        assert!(state.defer());
        assert!(!state.end());
        assert!(state.pending());
        assert!(state.end());
    }

    #[test]
    fn batch_without_change_delivers_nothing() {
        let state = BatchState::new();
        state.begin();
        assert!(!state.end());
    }

    #[test]
    fn unbalanced_end_saturates() {
        let state = BatchState::new();
        assert!(!state.end());
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let state = BatchState::new();
        state.begin();
        state.defer();
        state.reset();
        assert_eq!(state.depth(), 0);
        assert!(!state.pending());
    }
}
