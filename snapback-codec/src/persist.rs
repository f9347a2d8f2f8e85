//! The snapshot capability traits and the bridge impls for leaf values.
//!
//! Everything the codec walks implements [`Persist`]: schema-described
//! objects, reconciling collections, polymorphic slots, and plain scalars.
//! A snapshot is always produced fresh and never mutated in place; a load
//! mutates the live value toward the supplied data, preserving object
//! identity wherever an existing value can absorb the data in place.

use crate::{PersistError, PersistResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snapback_reactive::Tracked;
use tracing::trace;

/// The plain tree value format snapshots are made of: nested maps,
/// sequences and scalars.
pub type Snapshot = serde_json::Value;

/// A value that participates in snapshot save/load.
///
/// `save` must not mutate observable state; `load` mutates the value in
/// place toward `data`. The two probe methods expose optional capabilities
/// the way [`Dispose`] hooks are probed: the default implementations
/// declare the capability absent.
pub trait Persist {
    /// Produces this value's current snapshot.
    fn save(&self) -> Snapshot;

    /// Mutates this value in place to match `data`.
    ///
    /// The default rejects the load: a type that overrides only `save` is a
    /// save-only value, and loading into it fails with
    /// [`PersistError::InvalidTarget`].
    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        let _ = data;
        Err(PersistError::InvalidTarget)
    }

    /// Monotonic change counter for memoized saves; `None` when this value
    /// does not track its mutations (every save then recomputes).
    fn revision(&self) -> Option<u64> {
        None
    }

    /// Teardown probe. Containers call [`Dispose::dispose`] on owned values
    /// they drop during reconciliation or variant switches.
    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        None
    }
}

/// Explicit teardown for values owned by a collection or polymorphic slot.
pub trait Dispose {
    /// Releases resources held by this value. Called at most once by any
    /// single owner, synchronously, before the value is dropped.
    fn dispose(&mut self);
}

/// Saves any persistable value to a snapshot.
///
/// Pure with respect to `value`'s observable state.
pub fn save<T: Persist + ?Sized>(value: &T) -> Snapshot {
    value.save()
}

/// Loads snapshot data into a live value.
///
/// Absent (`Null`) data does nothing — an omitted subtree never clobbers
/// live state. Within an object walk, a *present* null key is meaningful
/// and clears optional fields; that path goes through [`Persist::load`]
/// directly.
pub fn load<T: Persist + ?Sized>(value: &mut T, data: &Snapshot) -> PersistResult<()> {
    if data.is_null() {
        return Ok(());
    }
    value.load(data)
}

/// Wires a type's [`Persist`] impl to its [`Schema`](crate::Schema) static.
#[macro_export]
macro_rules! impl_persist {
    ($ty:ty => $schema:expr) => {
        impl $crate::Persist for $ty {
            fn save(&self) -> $crate::Snapshot {
                $schema.save(self)
            }

            fn load(&mut self, data: &$crate::Snapshot) -> $crate::PersistResult<()> {
                $schema.load(self, data)
            }

            fn revision(&self) -> ::core::option::Option<u64> {
                $schema.revision(self)
            }
        }
    };
}

// --- bridge impls -----------------------------------------------------------

fn scalar_save<T: Serialize>(value: &T) -> Snapshot {
    serde_json::to_value(value).unwrap_or(Snapshot::Null)
}

fn scalar_load<T: DeserializeOwned>(data: &Snapshot) -> Option<T> {
    serde_json::from_value(data.clone()).ok()
}

/// Scalars round-trip through serde. A load of mistyped data is a guarded
/// no-op rather than an error: snapshots routinely outlive the schema that
/// wrote them.
macro_rules! scalar_persist {
    ($($ty:ty),* $(,)?) => {$(
        impl Persist for $ty {
            fn save(&self) -> Snapshot {
                scalar_save(self)
            }

            fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
                match scalar_load::<$ty>(data) {
                    Some(value) => *self = value,
                    None => trace!(
                        ty = stringify!($ty),
                        "ignoring mistyped scalar data"
                    ),
                }
                Ok(())
            }
        }
    )*};
}

scalar_persist!(bool, char, String, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// A raw tree field: the application stores snapshot data directly.
impl Persist for Snapshot {
    fn save(&self) -> Snapshot {
        self.clone()
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        *self = data.clone();
        Ok(())
    }
}

/// An absent value saves as `Null`; a present null clears it. Data arriving
/// at an empty slot constructs a default value and loads into it, so
/// optional subtrees can be re-grown from a snapshot.
impl<T: Persist + Default> Persist for Option<T> {
    fn save(&self) -> Snapshot {
        match self {
            Some(value) => value.save(),
            None => Snapshot::Null,
        }
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        if data.is_null() {
            *self = None;
            return Ok(());
        }
        match self {
            Some(value) => value.load(data),
            None => {
                let mut value = T::default();
                value.load(data)?;
                *self = Some(value);
                Ok(())
            }
        }
    }

    fn revision(&self) -> Option<u64> {
        match self {
            Some(value) => value.revision(),
            None => None,
        }
    }

    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        self.as_mut().and_then(Persist::as_dispose)
    }
}

impl<T: Persist + ?Sized> Persist for Box<T> {
    fn save(&self) -> Snapshot {
        (**self).save()
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        (**self).load(data)
    }

    fn revision(&self) -> Option<u64> {
        (**self).revision()
    }

    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        (**self).as_dispose()
    }
}

/// A plain, non-reconciling sequence: loading a sequence replaces the
/// contents positionally, loading anything else clears it. Items keep no
/// identity across loads — for identity-preserving merges use
/// [`Collection`](crate::Collection).
impl<T: Persist + Default> Persist for Vec<T> {
    fn save(&self) -> Snapshot {
        Snapshot::Array(self.iter().map(Persist::save).collect())
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        let Some(entries) = data.as_array() else {
            trace!("clearing sequence loaded from non-sequence data");
            self.clear();
            return Ok(());
        };
        self.truncate(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if index < self.len() {
                self[index].load(entry)?;
            } else {
                let mut item = T::default();
                item.load(entry)?;
                self.push(item);
            }
        }
        Ok(())
    }
}

/// A tracked field persists as its inner value; its stamp doubles as the
/// revision the codec memoizes against.
impl<T: Persist> Persist for Tracked<T> {
    fn save(&self) -> Snapshot {
        self.get().save()
    }

    fn load(&mut self, data: &Snapshot) -> PersistResult<()> {
        (**self).load(data)
    }

    fn revision(&self) -> Option<u64> {
        // The cell stamps every mutable access, so its own revision bounds
        // the inner value's last change even when T is untracked.
        Some(self.rev())
    }

    fn as_dispose(&mut self) -> Option<&mut dyn Dispose> {
        (**self).as_dispose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_round_trip() {
        let mut n = 5_i32;
        assert_eq!(n.save(), json!(5));
        n.load(&json!(9)).unwrap();
        assert_eq!(n, 9);

        let mut s = String::from("hi");
        s.load(&json!("there")).unwrap();
        assert_eq!(s, "there");
    }

    #[test]
    fn mistyped_scalar_is_ignored() {
        let mut n = 5_i32;
        n.load(&json!("not a number")).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn absent_data_is_a_no_op() {
        let mut n = 5_i32;
        load(&mut n, &Snapshot::Null).unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn option_clears_on_null_and_regrows() {
        let mut slot: Option<u32> = Some(4);
        slot.load(&Snapshot::Null).unwrap();
        assert_eq!(slot, None);
        slot.load(&json!(7)).unwrap();
        assert_eq!(slot, Some(7));
    }

    #[test]
    fn vec_replaces_positionally_and_clears_on_drift() {
        let mut v = vec![1_u32, 2, 3];
        v.load(&json!([7, 8])).unwrap();
        assert_eq!(v, vec![7, 8]);
        v.load(&json!({"not": "a sequence"})).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn save_only_value_rejects_load() {
        struct Exported;
        impl Persist for Exported {
            fn save(&self) -> Snapshot {
                json!({"exported": true})
            }
        }

        let mut value = Exported;
        assert_eq!(value.load(&json!({})), Err(PersistError::InvalidTarget));
    }

    #[test]
    fn tracked_field_reports_revision() {
        let mut cell = Tracked::new(3_u32);
        let r1 = Persist::revision(&cell).unwrap();
        cell.set(4);
        let r2 = Persist::revision(&cell).unwrap();
        assert!(r2 > r1);
    }
}
