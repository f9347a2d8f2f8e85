//! Revision-keyed cache slot.

use std::cell::RefCell;
use std::fmt;

/// A per-instance memo slot.
///
/// Holds the last computed value together with the revision it was computed
/// at. A lookup hits only when the caller's current revision equals the
/// cached one; an untracked caller (`None` revision) always recomputes and
/// never populates the slot, matching how an unobserved derived value
/// behaves in a dependency-tracking system.
#[derive(Default)]
pub struct Memo<V> {
    slot: RefCell<Option<(u64, V)>>,
}

impl<V: Clone> Memo<V> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    /// Returns the cached value for `rev`, or computes, caches and returns
    /// a fresh one.
    pub fn get_or_compute(&self, rev: Option<u64>, compute: impl FnOnce() -> V) -> V {
        let Some(rev) = rev else {
            return compute();
        };

        if let Some((cached_rev, cached)) = &*self.slot.borrow() {
            if *cached_rev == rev {
                return cached.clone();
            }
        }

        let value = compute();
        *self.slot.borrow_mut() = Some((rev, value.clone()));
        value
    }

    /// Drops any cached value.
    pub fn invalidate(&self) {
        *self.slot.borrow_mut() = None;
    }

    /// True if the slot currently holds a value for `rev`.
    #[must_use]
    pub fn is_fresh(&self, rev: u64) -> bool {
        matches!(&*self.slot.borrow(), Some((cached, _)) if *cached == rev)
    }
}

// A memo is derived state; cloning an owner starts the clone cold.
impl<V> Clone for Memo<V> {
    fn clone(&self) -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }
}

impl<V> fmt::Debug for Memo<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filled = self.slot.borrow().is_some();
        f.debug_struct("Memo").field("filled", &filled).finish()
    }
}
