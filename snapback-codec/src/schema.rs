//! Per-type property schemas.
//!
//! A [`Schema`] is the explicit, order-preserving registry of the fields a
//! type persists. Each inheritance level owns its own schema; a subtype
//! chains to the embedded supertype value with [`SchemaBuilder::parent`],
//! and snapshot composition starts from a *copy* of the supertype's
//! snapshot, so sibling subtypes never interfere through shared state.
//!
//! Schemas are built once at startup (typically in a `LazyLock` static) and
//! are read-only afterwards. Registration order is significant: it fixes
//! snapshot key insertion order.

use crate::{Persist, PersistResult, Snapshot};
use serde_json::Map;
use snapback_reactive::{Memo, combine};
use tracing::trace;

/// Ordered persistence schema for one type at one inheritance level.
pub struct Schema<T> {
    properties: Vec<Property<T>>,
    parent: Option<Box<dyn FieldAccess<T>>>,
    memo: Option<Box<dyn Fn(&T) -> &Memo<Snapshot> + Send + Sync>>,
}

struct Property<T> {
    name: String,
    binding: Binding<T>,
}

enum Binding<T> {
    /// A stored field reached through a lens pair; loads write through it.
    Stored(Box<dyn FieldAccess<T>>),
    /// A derived value: appears in saved output, never written by a load.
    Computed(Box<dyn Fn(&T) -> Snapshot + Send + Sync>),
}

/// Object-safe access to one field of `T`, erasing the field's type.
trait FieldAccess<T>: Send + Sync {
    fn save(&self, obj: &T) -> Snapshot;
    fn load(&self, obj: &mut T, data: &Snapshot) -> PersistResult<()>;
    fn revision(&self, obj: &T) -> Option<u64>;
}

struct Lens<F, G, M> {
    get: G,
    get_mut: M,
    field: std::marker::PhantomData<fn() -> F>,
}

impl<T, F, G, M> FieldAccess<T> for Lens<F, G, M>
where
    F: Persist,
    G: Fn(&T) -> &F + Send + Sync,
    M: for<'a> Fn(&'a mut T) -> &'a mut F + Send + Sync,
{
    fn save(&self, obj: &T) -> Snapshot {
        (self.get)(obj).save()
    }

    fn load(&self, obj: &mut T, data: &Snapshot) -> PersistResult<()> {
        (self.get_mut)(obj).load(data)
    }

    fn revision(&self, obj: &T) -> Option<u64> {
        (self.get)(obj).revision()
    }
}

impl<T> Schema<T> {
    /// Starts a schema definition.
    #[must_use]
    pub fn builder() -> SchemaBuilder<T> {
        SchemaBuilder {
            schema: Schema {
                properties: Vec::new(),
                parent: None,
                memo: None,
            },
        }
    }

    /// Produces the composed snapshot of `obj`.
    ///
    /// Starts from a copy of the supertype's snapshot, then sets every
    /// registered property in registration order. With a memo slot wired
    /// and all participants tracked, repeated saves without an intervening
    /// mutation return the cached snapshot without redoing the field walk.
    pub fn save(&self, obj: &T) -> Snapshot {
        match &self.memo {
            Some(slot) => slot(obj).get_or_compute(self.revision(obj), || self.compute(obj)),
            None => self.compute(obj),
        }
    }

    fn compute(&self, obj: &T) -> Snapshot {
        let mut data = match &self.parent {
            // Non-map supertype snapshots contribute no keys.
            Some(parent) => match parent.save(obj) {
                Snapshot::Object(map) => map,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        for property in &self.properties {
            let value = match &property.binding {
                Binding::Stored(access) => access.save(obj),
                Binding::Computed(get) => get(obj),
            };
            data.insert(property.name.clone(), value);
        }
        Snapshot::Object(data)
    }

    /// Loads snapshot data into `obj`.
    ///
    /// Ancestor fields are restored first. Only keys present in `data` are
    /// applied; nested persistable fields are loaded in place so object
    /// identity survives. Computed properties are never written. Non-map
    /// data is ignored — schema drift is not an error.
    pub fn load(&self, obj: &mut T, data: &Snapshot) -> PersistResult<()> {
        let Some(map) = data.as_object() else {
            trace!("ignoring non-map data for object load");
            return Ok(());
        };
        if let Some(parent) = &self.parent {
            parent.load(obj, data)?;
        }
        for property in &self.properties {
            if let Binding::Stored(access) = &property.binding {
                if let Some(incoming) = map.get(&property.name) {
                    access.load(obj, incoming)?;
                }
            }
        }
        Ok(())
    }

    /// Composite revision of `obj`: the supertype's and every stored
    /// field's stamps combined; `None` if any participant is untracked.
    pub fn revision(&self, obj: &T) -> Option<u64> {
        combine(
            self.parent
                .iter()
                .map(|parent| parent.revision(obj))
                .chain(self.properties.iter().filter_map(|p| match &p.binding {
                    Binding::Stored(access) => Some(access.revision(obj)),
                    Binding::Computed(_) => None,
                })),
        )
    }

    /// The registered property names for this level, in registration order.
    /// Supertype properties are composed through snapshot delegation, not
    /// listed here.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

/// Builder for [`Schema`]. Registration order is preserved.
pub struct SchemaBuilder<T> {
    schema: Schema<T>,
}

impl<T> SchemaBuilder<T> {
    /// Registers a stored property backed by any persistable field.
    #[must_use]
    pub fn field<F>(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&T) -> &F + Send + Sync + 'static,
        get_mut: impl for<'a> Fn(&'a mut T) -> &'a mut F + Send + Sync + 'static,
    ) -> Self
    where
        F: Persist + 'static,
        T: 'static,
    {
        self.schema.properties.push(Property {
            name: name.into(),
            binding: Binding::Stored(Box::new(Lens {
                get,
                get_mut,
                field: std::marker::PhantomData,
            })),
        });
        self
    }

    /// Registers a computed (getter-only) property. It is saved like any
    /// other field but a load never overwrites it, so values derived from
    /// stored fields round-trip without conflict.
    #[must_use]
    pub fn computed(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&T) -> Snapshot + Send + Sync + 'static,
    ) -> Self {
        self.schema.properties.push(Property {
            name: name.into(),
            binding: Binding::Computed(Box::new(get)),
        });
        self
    }

    /// Chains this level to the embedded supertype value. Saves start from
    /// a copy of the supertype snapshot; loads restore the supertype first.
    #[must_use]
    pub fn parent<P>(
        mut self,
        get: impl Fn(&T) -> &P + Send + Sync + 'static,
        get_mut: impl for<'a> Fn(&'a mut T) -> &'a mut P + Send + Sync + 'static,
    ) -> Self
    where
        P: Persist + 'static,
        T: 'static,
    {
        self.schema.parent = Some(Box::new(Lens {
            get,
            get_mut,
            field: std::marker::PhantomData,
        }));
        self
    }

    /// Wires the per-instance memo slot used to cache composed snapshots.
    #[must_use]
    pub fn memo(mut self, slot: impl Fn(&T) -> &Memo<Snapshot> + Send + Sync + 'static) -> Self {
        self.schema.memo = Some(Box::new(slot));
        self
    }

    /// Finishes the schema.
    #[must_use]
    pub fn build(self) -> Schema<T> {
        self.schema
    }
}
