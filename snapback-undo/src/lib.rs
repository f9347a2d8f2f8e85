//! Snapshot-based undo/redo.
//!
//! An [`UndoManager`] watches one persistable root and keeps two stacks of
//! its snapshots: past states and future states. Undo and redo are snapshot
//! swaps — pop a state, push the current one onto the opposite stack, load
//! the popped snapshot back into the root.
//!
//! There is no ambient change-observation here; the application calls
//! [`UndoManager::observe`] after each logical change. A batch of field
//! mutations observed once is captured as a single transaction — one undo
//! entry, not one per field.

use snapback_codec::{Dispose, Persist, PersistResult, Snapshot, save};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Callback invoked after every captured or restored state, with the new
/// state and the state it replaced (`None` only for the initial capture).
pub type TransactionHook = Box<dyn FnMut(&Snapshot, Option<&Snapshot>)>;

/// Undo/redo manager for a single persistable root.
///
/// Pushing a new state clears the redo stack — divergent timelines are not
/// preserved. The `enabled` flag suppresses exactly one capture: the one a
/// restoring load would otherwise trigger, so undoing never records the
/// state it just restored as a fresh edit.
pub struct UndoManager<R: Persist> {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    current: Snapshot,
    last_rev: Option<u64>,
    enabled: bool,
    active: bool,
    on_transaction: Option<TransactionHook>,
    root: PhantomData<fn(R)>,
}

impl<R: Persist> UndoManager<R> {
    /// Captures `root`'s initial state. Nothing is pushed — there is no
    /// previous state to return to yet.
    #[must_use]
    pub fn new(root: &R) -> Self {
        Self::build(root, None)
    }

    /// Like [`new`](Self::new), with a transaction hook. The hook fires
    /// once immediately for the initial state, with no previous state.
    #[must_use]
    pub fn with_hook(
        root: &R,
        hook: impl FnMut(&Snapshot, Option<&Snapshot>) + 'static,
    ) -> Self {
        Self::build(root, Some(Box::new(hook)))
    }

    fn build(root: &R, on_transaction: Option<TransactionHook>) -> Self {
        let mut manager = Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            current: save(root),
            last_rev: root.revision(),
            enabled: true,
            active: true,
            on_transaction,
            root: PhantomData,
        };
        if let Some(hook) = &mut manager.on_transaction {
            hook(&manager.current, None);
        }
        manager
    }

    /// Observes the root after a logical change.
    ///
    /// If the root is unchanged since the last observation this does
    /// nothing. Otherwise the previous state is pushed onto the undo stack,
    /// the redo stack is cleared, and the hook fires. Returns whether a
    /// transaction was captured.
    ///
    /// The one observation following an undo/redo load instead re-arms
    /// capture without recording, and reports `false`.
    pub fn observe(&mut self, root: &R) -> bool {
        if !self.active {
            return false;
        }

        if !self.enabled {
            // Re-entrant observation of a restoring load: swallow it.
            self.refresh(root);
            self.enabled = true;
            return false;
        }

        if let Some(rev) = root.revision() {
            if self.last_rev == Some(rev) {
                return false;
            }
        }
        let snapshot = save(root);
        if snapshot == self.current {
            // Stamped but semantically unchanged; nothing to capture.
            self.last_rev = root.revision();
            return false;
        }

        self.redo_stack.clear();
        self.last_rev = root.revision();
        let previous = std::mem::replace(&mut self.current, snapshot);
        self.undo_stack.push(previous.clone());
        debug!(depth = self.undo_stack.len(), "captured undo state");
        if let Some(hook) = &mut self.on_transaction {
            hook(&self.current, Some(&previous));
        }
        true
    }

    /// Restores the most recent past state. Returns whether a state was
    /// applied (`Ok(false)` when the undo stack is empty or the manager is
    /// disposed).
    pub fn undo(&mut self, root: &mut R) -> PersistResult<bool> {
        self.swap(root, true)
    }

    /// Restores the most recently undone state; the mirror of [`undo`](Self::undo).
    pub fn redo(&mut self, root: &mut R) -> PersistResult<bool> {
        self.swap(root, false)
    }

    fn swap(&mut self, root: &mut R, from_undo: bool) -> PersistResult<bool> {
        if !self.active {
            return Ok(false);
        }
        let popped = if from_undo {
            self.undo_stack.pop()
        } else {
            self.redo_stack.pop()
        };
        let Some(popped) = popped else {
            return Ok(false);
        };

        let direction = if from_undo { "undo" } else { "redo" };
        if from_undo {
            self.redo_stack.push(self.current.clone());
        } else {
            self.undo_stack.push(self.current.clone());
        }
        trace!(direction, "restoring state");

        // The restoring load must not be captured as a fresh edit; the
        // next observation re-arms the flag instead of recording.
        self.enabled = false;
        root.load(&popped)?;
        self.observe(root);
        Ok(true)
    }

    fn refresh(&mut self, root: &R) {
        let snapshot = save(root);
        self.last_rev = root.revision();
        let previous = std::mem::replace(&mut self.current, snapshot);
        if let Some(hook) = &mut self.on_transaction {
            hook(&self.current, Some(&previous));
        }
    }

    /// True if a past state is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// True if an undone state is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Stops observation. The stacks are kept, and remain queryable, but
    /// no further state is captured or restored.
    pub fn dispose(&mut self) {
        self.active = false;
    }
}

impl<R: Persist> Dispose for UndoManager<R> {
    fn dispose(&mut self) {
        UndoManager::dispose(self);
    }
}

impl<R: Persist> fmt::Debug for UndoManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoManager")
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("enabled", &self.enabled)
            .field("active", &self.active)
            .finish()
    }
}
