//! Error taxonomy for pipeline enumeration.
//!
//! The pipeline is a thin orchestration layer: it catches nothing and
//! retries nothing. Joiner and source faults propagate untouched inside
//! [`JoinError::Joiner`] / [`JoinError::Source`]; missing data is never an
//! error (it flows to binders as an absent marker); cancellation is a
//! distinct outcome, not a fault.

use thiserror::Error;

/// Terminal failure of one pipeline enumeration.
#[derive(Debug, Error)]
pub enum JoinError {
    /// A value joiner broke its length contract: it must return exactly one
    /// result slot per input item.
    #[error("value joiner returned {actual} results for a batch of {expected}")]
    ValueJoinerLength { expected: usize, actual: usize },

    /// An erased payload did not hold the aggregate type the fold expected.
    /// Unreachable through the typed chain-building API.
    #[error("aggregate type mismatch: expected {expected}")]
    AggregateType { expected: &'static str },

    /// A binder observed an absent prior aggregate. Unreachable through the
    /// typed chain-building API (the fold truncates before this can occur).
    #[error("aggregate absent where a prior value was required")]
    AbsentAggregate,

    /// An external joiner failed while resolving a batch.
    #[error("joiner failed")]
    Joiner(#[source] anyhow::Error),

    /// The batch source failed while producing the next batch.
    #[error("batch source failed")]
    Source(#[source] anyhow::Error),

    /// The enumeration observed its cancellation token.
    #[error("enumeration cancelled")]
    Cancelled,
}

impl JoinError {
    /// Wrap a joiner fault, passing a nested pipeline's own `JoinError`
    /// through unchanged (re-rooted pipelines surface typed errors).
    pub(crate) fn joiner(err: anyhow::Error) -> Self {
        match err.downcast::<JoinError>() {
            Ok(inner) => inner,
            Err(err) => JoinError::Joiner(err),
        }
    }

    /// Wrap a batch source fault, passing a nested `JoinError` through.
    pub(crate) fn source(err: anyhow::Error) -> Self {
        match err.downcast::<JoinError>() {
            Ok(inner) => inner,
            Err(err) => JoinError::Source(err),
        }
    }
}
