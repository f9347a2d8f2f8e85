//! Change-tracking substrate for the snapback codec.
//!
//! The codec needs one contract from its reactive collaborator: "compute a
//! snapshot lazily, cache it, and invalidate the cache automatically when
//! any participating field changes". This crate provides the minimal
//! dirty-flag implementation of that contract:
//!
//! - [`next_rev`] — a process-wide monotonic revision clock
//! - [`Tracked<T>`] — a field cell that stamps itself with a fresh revision
//!   on every mutable access
//! - [`Memo<V>`] — a per-instance cache slot keyed by revision
//!
//! Composite values report the maximum of their members' stamps, so a stale
//! cache entry can never collide with a newer state: every mutation path
//! takes a fresh tick from the shared clock.

mod memo;
mod tracked;

pub use memo::Memo;
pub use tracked::Tracked;

use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// Draws the next revision from the process-wide clock.
///
/// Revisions are strictly increasing across all tracked values, which makes
/// "max of member stamps" a valid staleness check for composites.
#[must_use]
pub fn next_rev() -> u64 {
    CLOCK.fetch_add(1, Ordering::Relaxed)
}

/// Combines member revisions into a composite revision.
///
/// Returns the maximum stamp, or `None` if any member is untracked —
/// an untracked member can change invisibly, so the composite must
/// recompute on every read.
#[must_use]
pub fn combine(revs: impl IntoIterator<Item = Option<u64>>) -> Option<u64> {
    let mut max = 0;
    for rev in revs {
        max = max.max(rev?);
    }
    Some(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_strictly_increasing() {
        let a = next_rev();
        let b = next_rev();
        assert!(b > a);
    }

    #[test]
    fn combine_takes_maximum() {
        assert_eq!(combine([Some(3), Some(7), Some(5)]), Some(7));
        assert_eq!(combine([]), Some(0));
    }

    #[test]
    fn combine_poisons_on_untracked_member() {
        assert_eq!(combine([Some(3), None, Some(5)]), None);
    }
}
