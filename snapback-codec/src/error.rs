//! Error types for the codec.

use crate::collection::ItemKey;
use thiserror::Error;

/// Result type for codec operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors that can occur while loading snapshot data into a live graph.
///
/// Schema drift (data of the wrong shape for its target) is not an error:
/// the codec resets or skips the target instead, since old snapshots
/// routinely outlive the application schema that wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// The load target can produce snapshots but cannot absorb them.
    #[error("cannot load into a value without a snapshot-set capability")]
    InvalidTarget,

    /// Two live collection items share a non-empty identifier, or incoming
    /// data carries a duplicate external key. Indicates a caller bug; never
    /// repaired silently.
    #[error("duplicate item id {0}")]
    DuplicateId(ItemKey),

    /// An externally-keyed collection loaded an item whose designated key
    /// field did not round-trip through its snapshot.
    #[error("collection items must persist their {0:?} key field")]
    KeyNotPersisted(String),
}
