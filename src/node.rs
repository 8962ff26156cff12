//! Type-erased chain links behind the typed pipeline facades.

use crate::cancel::CancellationToken;
use crate::erased::Slot;
use crate::error::JoinError;
use crate::operation::BatchOperation;
use crate::source::BatchSource;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Creates one fresh stateful operation per enumeration.
pub(crate) type OpFactory<T> = Arc<dyn Fn() -> Box<dyn BatchOperation<T>> + Send + Sync>;

/// Folds a stage's fetched slot into the running per-item aggregate:
/// `binder(item, fetched, prior) -> new aggregate`.
pub(crate) type DynBinder<T> =
    Arc<dyn Fn(&T, Slot, Slot) -> Result<Slot, JoinError> + Send + Sync>;

/// The joiner shape for distinct-key stages: receives the deduplicated
/// cache-miss key set, returns an async sequence of resolved pairs.
pub(crate) type KeyJoiner<K, R> = Arc<
    dyn Fn(Vec<K>, CancellationToken) -> BoxStream<'static, anyhow::Result<(K, Option<R>)>>
        + Send
        + Sync,
>;

/// The joiner shape for value stages: receives the full ordered batch.
pub(crate) type ValueJoiner<T, R> = Arc<
    dyn Fn(Vec<T>, CancellationToken) -> BoxFuture<'static, anyhow::Result<Vec<Option<R>>>>
        + Send
        + Sync,
>;

/// The parent link of a join stage: either the root batch source or another
/// join stage closer to the root.
pub(crate) enum Upstream<T> {
    Source(Arc<dyn BatchSource<T>>),
    Join(Arc<JoinNode<T>>),
}

impl<T> Clone for Upstream<T> {
    fn clone(&self) -> Self {
        match self {
            Upstream::Source(s) => Upstream::Source(Arc::clone(s)),
            Upstream::Join(n) => Upstream::Join(Arc::clone(n)),
        }
    }
}

/// One join stage in a pipeline definition.
///
/// The definition is immutable and side-effect free; all mutable execution
/// state (operations, caches) is created per enumeration via `factory`.
pub(crate) struct JoinNode<T> {
    pub(crate) upstream: Upstream<T>,
    pub(crate) factory: OpFactory<T>,
    pub(crate) binder: DynBinder<T>,
}
