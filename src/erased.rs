//! Type-erased stage payloads.
//!
//! Join stages are stored heterogeneously in one chain: each stage fetches
//! its own related type and folds into its own aggregate type, so the values
//! passed between stages at runtime are boxed as opaque payloads. The typed
//! chain-building API in [`joins`](crate::joins) makes type mismatches
//! structurally unreachable; the downcasts here are a safety net that fails
//! as a [`JoinError`] rather than silently.

use crate::error::JoinError;
use std::any::{Any, type_name};

/// An opaque fetched value or aggregate carried between stages.
pub(crate) type Erased = Box<dyn Any + Send + Sync>;

/// One per-item result slot. `None` means the stage resolved nothing for
/// this item (absent is data, not an error).
pub(crate) type Slot = Option<Erased>;

pub(crate) fn boxed<V: Send + Sync + 'static>(value: V) -> Erased {
    Box::new(value)
}

/// Recover the concrete value behind an erased payload.
pub(crate) fn unbox<V: Any>(payload: Erased) -> Result<V, JoinError> {
    payload
        .downcast::<V>()
        .map(|b| *b)
        .map_err(|_| JoinError::AggregateType {
            expected: type_name::<V>(),
        })
}

/// Like [`unbox`], preserving absence.
pub(crate) fn unbox_slot<V: Any>(slot: Slot) -> Result<Option<V>, JoinError> {
    slot.map(unbox::<V>).transpose()
}
