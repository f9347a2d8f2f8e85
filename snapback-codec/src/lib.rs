//! Bidirectional codec between a live, mutable object graph and a plain
//! tree-structured snapshot format.
//!
//! Applications declare which fields of a type persist; the codec then
//! mechanically produces a snapshot from the graph ([`save`]) or mutates an
//! existing graph to match a snapshot ([`load`]) while preserving object
//! identity wherever possible. The pieces:
//!
//! - [`Persist`] / [`Dispose`] — the capability traits the codec walks
//! - [`Schema`] — ordered per-type property registry, composed across
//!   inheritance levels through explicit parent chaining
//! - [`Collection`] — ordered sequence with identity-preserving
//!   snapshot reconciliation (stable synthetic ids or an external key)
//! - [`Polymorph`] — single-slot tagged-variant holder
//!
//! Change tracking and snapshot memoization come from `snapback-reactive`,
//! re-exported here as [`Tracked`] and [`Memo`].
//!
//! The codec is single-threaded and synchronous: saves, loads and
//! reconciliations run to completion without yielding, over a graph
//! assumed to be acyclic.

mod collection;
mod error;
mod persist;
mod polymorph;
mod schema;

pub use collection::{Collection, ID_KEY, Identified, ItemId, ItemKey, id_of};
pub use error::{PersistError, PersistResult};
pub use persist::{Dispose, Persist, Snapshot, load, save};
pub use polymorph::Polymorph;
pub use schema::{Schema, SchemaBuilder};

pub use snapback_reactive::{Memo, Tracked};
