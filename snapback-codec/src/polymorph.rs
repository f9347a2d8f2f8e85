//! Single-slot tagged-variant holder.

use crate::{Dispose, Persist, PersistResult, Snapshot, persist};
use serde_json::json;
use snapback_reactive::next_rev;
use std::cell::Cell;
use std::fmt;
use tracing::{debug, trace};

/// Owns exactly one variant instance at a time, selected by a string
/// discriminator and built through an injected type-keyed factory.
///
/// Switching the discriminator constructs the replacement *before* the old
/// instance's resources are released, then swaps and disposes the old one.
/// The instance type is anything persistable — typically `Box<dyn Persist>`
/// when the variants are unrelated types.
///
/// Snapshot layout: `{ "type": discriminator, "settings": <instance> }`.
pub struct Polymorph<T> {
    kind: String,
    target: T,
    factory: Box<dyn Fn(&str) -> T>,
    rev: Cell<u64>,
}

impl<T: Persist> Polymorph<T> {
    /// Builds the initial instance for `kind` and takes ownership of it.
    #[must_use]
    pub fn new(kind: impl Into<String>, factory: impl Fn(&str) -> T + 'static) -> Self {
        let kind = kind.into();
        let target = factory(&kind);
        Self {
            kind,
            target,
            factory: Box::new(factory),
            rev: Cell::new(next_rev()),
        }
    }

    /// The current discriminator.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The currently held instance.
    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the held instance.
    pub fn target_mut(&mut self) -> &mut T {
        self.rev.set(next_rev());
        &mut self.target
    }

    /// Switches to `kind`, replacing the held instance.
    ///
    /// No-op when `kind` is already current. Otherwise the factory builds
    /// the new instance first, the slot swaps, and only then is the
    /// previous instance disposed. A fresh instance is never disposed and
    /// a replaced one never leaks.
    pub fn set_kind(&mut self, kind: &str) {
        if self.kind == kind {
            return;
        }
        debug!(from = %self.kind, to = %kind, "switching variant");
        let next = (self.factory)(kind);
        let mut previous = std::mem::replace(&mut self.target, next);
        self.kind = kind.to_string();
        self.rev.set(next_rev());
        if let Some(dispose) = previous.as_dispose() {
            dispose.dispose();
        }
    }

    /// Disposes the currently held instance.
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.target.as_dispose() {
            dispose.dispose();
        }
    }
}

impl<T: Persist> Persist for Polymorph<T> {
    fn save(&self) -> Snapshot {
        json!({
            "type": self.kind,
            "settings": self.target.save(),
        })
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        let kind = data
            .get("type")
            .and_then(Snapshot::as_str)
            .filter(|kind| !kind.is_empty());
        let Some(kind) = kind else {
            trace!("ignoring variant data without a type tag");
            return Ok(());
        };
        self.set_kind(kind);
        self.rev.set(next_rev());
        match data.get("settings") {
            Some(settings) => persist::load(&mut self.target, settings),
            None => Ok(()),
        }
    }

    fn revision(&self) -> Option<u64> {
        Some(self.rev.get().max(self.target.revision()?))
    }

    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        Some(self)
    }
}

/// Disposing the slot disposes its currently held instance.
impl<T: Persist> Dispose for Polymorph<T> {
    fn dispose(&mut self) {
        Polymorph::dispose(self);
    }
}

impl<T: fmt::Debug> fmt::Debug for Polymorph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polymorph")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .finish()
    }
}
