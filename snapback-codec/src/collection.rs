//! Reconciling collections.
//!
//! A [`Collection`] is an ordered, in-place-resizable sequence of
//! persistable items whose snapshot load is a *merge*: incoming entries are
//! matched to live items by a stable identifier, matched items are updated
//! in place (object identity and any non-persisted in-memory state
//! survive), unmatched entries are built fresh through the collection's
//! factory, and live items that lost their entry are disposed.
//!
//! Identity is either a synthetic sequential integer the collection assigns
//! and persists under the reserved [`ID_KEY`] field, or — with
//! [`Collection::with_key`] — a caller-designated field of the item's own
//! snapshot.

use crate::{Dispose, Persist, PersistError, PersistResult, Snapshot};
use serde_json::json;
use snapback_reactive::{Memo, next_rev};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use tracing::{debug, warn};

/// Reserved snapshot field carrying an item's synthetic identifier.
/// Angle brackets keep it out of the namespace of ordinary field names.
pub const ID_KEY: &str = "<id>";

/// Synthetic-identity slot probe for collection items.
///
/// Items that should keep their identity across save/load embed an
/// [`ItemId`] and forward these methods to it. The defaults declare no
/// slot: such items are treated as new on every merge, since "no id" never
/// matches "no id". Externally-keyed items can rely on the defaults.
pub trait Identified {
    /// The currently assigned synthetic id; 0 when none.
    fn item_id(&self) -> u64 {
        0
    }

    /// Stores a reconciler-assigned id. Interior mutability keeps this
    /// callable during save, where ids are first allocated.
    fn bind_item_id(&self, id: u64) {
        let _ = id;
    }
}

/// Reads an item's currently assigned synthetic identifier (0 if none).
///
/// Ids are allocated during save, so a freshly built item reports 0 until
/// its collection is first saved.
#[must_use]
pub fn id_of<T: Identified + ?Sized>(item: &T) -> u64 {
    item.item_id()
}

/// The embeddable synthetic-id slot.
///
/// Travels with the item: an item moved between collections keeps its id,
/// and the allocator never reassigns an id that is still unique.
#[derive(Debug, Clone, Default)]
pub struct ItemId(Cell<u64>);

impl ItemId {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The held id; 0 when none.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Replaces the held id.
    pub fn set(&self, id: u64) {
        self.0.set(id);
    }
}

/// A collection item's identity during matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// A synthetic id, or an external key field holding an unsigned number.
    Num(u64),
    /// An external key field holding any other scalar, rendered as text.
    Text(String),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Num(n) => write!(f, "{n}"),
            ItemKey::Text(s) => write!(f, "{s}"),
        }
    }
}

fn value_key(value: &Snapshot) -> Option<ItemKey> {
    match value {
        Snapshot::String(s) => Some(ItemKey::Text(s.clone())),
        Snapshot::Number(n) => match n.as_u64() {
            Some(u) => Some(ItemKey::Num(u)),
            None => Some(ItemKey::Text(n.to_string())),
        },
        _ => None,
    }
}

/// An ordered collection with identity-preserving snapshot reconciliation.
pub struct Collection<T> {
    items: Vec<T>,
    factory: Box<dyn Fn() -> T>,
    id_key: Option<String>,
    rev: Cell<u64>,
    memo: Memo<Snapshot>,
}

impl<T: Persist + Identified> Collection<T> {
    /// Creates a collection whose item identity is the synthetic id slot.
    #[must_use]
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        Self {
            items: Vec::new(),
            factory: Box::new(factory),
            id_key: None,
            rev: Cell::new(next_rev()),
            memo: Memo::new(),
        }
    }

    /// Creates a collection keyed by a designated field of each item's own
    /// snapshot. No reserved id field is injected; the key is an ordinary
    /// persisted field and must round-trip through the item's snapshot.
    #[must_use]
    pub fn with_key(key: impl Into<String>, factory: impl Fn() -> T + 'static) -> Self {
        Self {
            items: Vec::new(),
            factory: Box::new(factory),
            id_key: Some(key.into()),
            rev: Cell::new(next_rev()),
            memo: Memo::new(),
        }
    }

    fn stamp(&mut self) {
        self.rev.set(next_rev());
    }

    /// Appends an item.
    pub fn push(&mut self, item: T) {
        self.stamp();
        self.items.push(item);
    }

    /// Inserts an item at `index`.
    pub fn insert(&mut self, index: usize, item: T) {
        self.stamp();
        self.items.insert(index, item);
    }

    /// Removes and returns the item at `index` without disposing it.
    pub fn remove(&mut self, index: usize) -> T {
        self.stamp();
        self.items.remove(index)
    }

    /// Removes all items without disposing them.
    pub fn clear(&mut self) {
        self.stamp();
        self.items.clear();
    }

    /// Shortens the collection to `len` items.
    pub fn truncate(&mut self, len: usize) {
        self.stamp();
        self.items.truncate(len);
    }

    /// Mutable access to the item at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.stamp();
        self.items.get_mut(index)
    }

    /// Mutable iteration over the items.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.stamp();
        self.items.iter_mut()
    }

    /// Identity of a live item, if it has one.
    fn live_key(&self, item: &T) -> Option<ItemKey> {
        match &self.id_key {
            None => match item.item_id() {
                0 => None,
                id => Some(ItemKey::Num(id)),
            },
            Some(key) => item.save().as_object().and_then(|map| {
                map.get(key).and_then(value_key)
            }),
        }
    }

    /// Identity carried by an incoming snapshot entry, if any.
    fn entry_key(&self, entry: &Snapshot) -> Option<ItemKey> {
        let field = match &self.id_key {
            None => ID_KEY,
            Some(key) => key.as_str(),
        };
        let value = entry.as_object()?.get(field)?;
        match &self.id_key {
            None => match value.as_u64() {
                Some(0) | None => None,
                Some(id) => Some(ItemKey::Num(id)),
            },
            Some(_) => value_key(value),
        }
    }

    /// Two-pass synthetic id allocation.
    ///
    /// Pass 1 computes the next free integer and clears the id of any item
    /// repeating an id already seen — the earlier occurrence keeps it.
    /// Pass 2 assigns the running next-free integer to every item still
    /// without one, left to right. An item holding a valid unique id never
    /// has it changed, so identifiers are maximally stable across repeated
    /// saves.
    fn allocate_ids(&self) {
        let mut next = 1;
        let mut used = HashSet::new();
        for item in &self.items {
            let id = item.item_id();
            if id != 0 {
                next = next.max(id + 1);
                if !used.insert(id) {
                    item.bind_item_id(0);
                }
            }
        }
        for item in &self.items {
            if item.item_id() == 0 {
                item.bind_item_id(next);
                next += 1;
            }
        }
    }

    fn compute_snapshot(&self) -> Snapshot {
        if self.id_key.is_none() {
            self.allocate_ids();
        }
        let entries = self
            .items
            .iter()
            .map(|item| {
                let mut snap = item.save();
                if self.id_key.is_none() {
                    // Non-map item snapshots cannot carry the id field and
                    // stay unstamped; such items merge as new every time.
                    if let Some(map) = snap.as_object_mut() {
                        map.insert(ID_KEY.to_string(), json!(item.item_id()));
                    }
                }
                snap
            })
            .collect();
        Snapshot::Array(entries)
    }

    /// Merges incoming entries into the live sequence. See the module docs
    /// for the matching rules; errors leave whatever partial state was
    /// reached (callers needing atomicity snapshot beforehand).
    fn reconcile(&mut self, entries: &[Snapshot]) -> PersistResult<()> {
        // Duplicate live ids signal a caller bug. Checked before anything
        // is moved, so this error leaves the collection untouched.
        let mut live = HashSet::new();
        for item in &self.items {
            if let Some(key) = self.live_key(item) {
                if !live.insert(key.clone()) {
                    return Err(PersistError::DuplicateId(key));
                }
            }
        }

        let mut existing: HashMap<ItemKey, T> = HashMap::new();
        let mut unkeyed: Vec<T> = Vec::new();
        for item in std::mem::take(&mut self.items) {
            match self.live_key(&item) {
                Some(key) => {
                    existing.insert(key, item);
                }
                None => unkeyed.push(item),
            }
        }

        let mut next_items: Vec<T> = Vec::with_capacity(entries.len());
        let mut outcome = Ok(());
        let mut seen_incoming: HashSet<ItemKey> = HashSet::new();
        let mut reused = 0_usize;
        let mut created = 0_usize;

        for entry in entries {
            let key = self.entry_key(entry);

            if let Some(key) = &key {
                if self.id_key.is_some() && !seen_incoming.insert(key.clone()) {
                    outcome = Err(PersistError::DuplicateId(key.clone()));
                    break;
                }
            }

            let mut item = match key.as_ref().and_then(|k| existing.remove(k)) {
                Some(item) => {
                    reused += 1;
                    item
                }
                None => {
                    created += 1;
                    let item = (self.factory)();
                    if self.id_key.is_none() {
                        if let Some(ItemKey::Num(id)) = key {
                            item.bind_item_id(id);
                        }
                    }
                    item
                }
            };

            if let Err(error) = item.load(entry) {
                next_items.push(item);
                outcome = Err(error);
                break;
            }

            if self.id_key.is_some() && self.live_key(&item) != key {
                let field = self.id_key.clone().unwrap_or_default();
                next_items.push(item);
                outcome = Err(PersistError::KeyNotPersisted(field));
                break;
            }

            next_items.push(item);
        }

        self.items = next_items;

        if outcome.is_ok() {
            let dropped = existing.len() + unkeyed.len();
            for mut item in existing.into_values().chain(unkeyed) {
                if let Some(dispose) = item.as_dispose() {
                    dispose.dispose();
                }
            }
            debug!(reused, created, dropped, "reconciled collection");
        }
        outcome
    }
}

impl<T> Deref for Collection<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T: Persist + Identified> Persist for Collection<T> {
    fn save(&self) -> Snapshot {
        self.memo
            .get_or_compute(self.revision(), || self.compute_snapshot())
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        self.stamp();
        match data.as_array() {
            Some(entries) => self.reconcile(entries),
            None => {
                // Most likely the schema changed underneath the snapshot.
                warn!("clearing collection loaded from non-sequence data");
                for mut item in std::mem::take(&mut self.items) {
                    if let Some(dispose) = item.as_dispose() {
                        dispose.dispose();
                    }
                }
                Ok(())
            }
        }
    }

    fn revision(&self) -> Option<u64> {
        let mut max = self.rev.get();
        for item in &self.items {
            max = max.max(item.revision()?);
        }
        Some(max)
    }

    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        Some(self)
    }
}

/// Disposing a collection disposes every item it owns.
impl<T: Persist + Identified> Dispose for Collection<T> {
    fn dispose(&mut self) {
        self.stamp();
        for item in &mut self.items {
            if let Some(dispose) = item.as_dispose() {
                dispose.dispose();
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("items", &self.items)
            .field("id_key", &self.id_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Plain {
        id: ItemId,
        value: Snapshot,
    }

    impl Persist for Plain {
        fn save(&self) -> Snapshot {
            self.value.clone()
        }

        fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
            self.value = data.clone();
            Ok(())
        }
    }

    impl Identified for Plain {
        fn item_id(&self) -> u64 {
            self.id.get()
        }

        fn bind_item_id(&self, id: u64) {
            self.id.set(id);
        }
    }

    fn with_ids(ids: &[u64]) -> Collection<Plain> {
        let mut c = Collection::new(Plain::default);
        for &id in ids {
            let item = Plain::default();
            item.id.set(id);
            c.push(item);
        }
        c
    }

    #[test]
    fn allocation_starts_at_one() {
        let c = with_ids(&[0, 0, 0]);
        c.allocate_ids();
        let ids: Vec<u64> = c.iter().map(id_of).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn allocation_never_moves_a_unique_id() {
        let c = with_ids(&[7, 0, 3]);
        c.allocate_ids();
        let ids: Vec<u64> = c.iter().map(id_of).collect();
        assert_eq!(ids, vec![7, 8, 3]);
    }

    #[test]
    fn earlier_duplicate_keeps_the_id() {
        let c = with_ids(&[2, 2]);
        c.allocate_ids();
        let ids: Vec<u64> = c.iter().map(id_of).collect();
        // The later duplicate is cleared in pass 1 and reassigned from the
        // free range in pass 2.
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn duplicate_live_ids_fail_without_mutating() {
        let mut c = with_ids(&[1, 1]);
        let err = c.load(&serde_json::json!([])).unwrap_err();
        assert_eq!(err, PersistError::DuplicateId(ItemKey::Num(1)));
        assert_eq!(c.len(), 2);
    }
}
