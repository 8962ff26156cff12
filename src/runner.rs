//! The pipeline enumerator: hierarchy snapshot and batch drive loop.
//!
//! Each enumeration walks the stage chain terminal → root, reverses it into
//! root-first order, and creates one fresh stateful operation per non-root
//! layer. It then drives one batch at a time: cancellation check, concurrent
//! fan-out of every layer over the raw batch, fan-in barrier, then a
//! per-item fold in declared layer order. The next batch is not requested
//! until the current one has been fully folded and emitted.

use crate::cancel::CancellationToken;
use crate::collection::Element;
use crate::erased::{self, Slot};
use crate::error::JoinError;
use crate::metrics::MetricsCollector;
use crate::node::{DynBinder, JoinNode, Upstream};
use crate::operation::BatchOperation;
use crate::source::BatchSource;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use log::debug;
use std::sync::Arc;

/// One non-root layer of an enumeration's hierarchy snapshot.
struct Layer<T> {
    op: Box<dyn BatchOperation<T>>,
    binder: DynBinder<T>,
}

/// Snapshot the chain into (root source, root-first layers) with fresh
/// operations.
fn build_hierarchy<T>(terminal: &Arc<JoinNode<T>>) -> (Arc<dyn BatchSource<T>>, Vec<Layer<T>>) {
    let mut layers = Vec::new();
    let mut current = Arc::clone(terminal);
    let source = loop {
        layers.push(Layer {
            op: (current.factory)(),
            binder: Arc::clone(&current.binder),
        });
        match current.upstream.clone() {
            Upstream::Source(source) => break source,
            Upstream::Join(parent) => current = parent,
        }
    };
    // Collected leaf-first; the fold walks root to leaf.
    layers.reverse();
    (source, layers)
}

struct Drive<T> {
    batches: BoxStream<'static, anyhow::Result<Vec<T>>>,
    layers: Vec<Layer<T>>,
    cancel: CancellationToken,
    metrics: Option<MetricsCollector>,
}

/// Enumerate a joined pipeline as a stream of folded (item, aggregate)
/// batches.
pub(crate) fn run_joined<T, A>(
    terminal: Arc<JoinNode<T>>,
    cancel: CancellationToken,
    metrics: Option<MetricsCollector>,
) -> BoxStream<'static, Result<Vec<(T, A)>, JoinError>>
where
    T: Element,
    A: Send + Sync + 'static,
{
    let (source, layers) = build_hierarchy(&terminal);
    let drive = Drive {
        batches: source.open(cancel.clone()),
        layers,
        cancel,
        metrics,
    };
    stream::try_unfold(drive, |mut drive| async move {
        if drive.cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }
        let Some(batch) = drive.batches.try_next().await.map_err(JoinError::source)? else {
            return Ok(None);
        };
        let pairs = process_batch::<T, A>(&mut drive, batch).await?;
        Ok(Some((pairs, drive)))
    })
    .boxed()
}

/// Enumerate a root pipeline (no join stages) as its raw batches.
pub(crate) fn run_root<T>(
    source: Arc<dyn BatchSource<T>>,
    cancel: CancellationToken,
    metrics: Option<MetricsCollector>,
) -> BoxStream<'static, Result<Vec<T>, JoinError>>
where
    T: Element,
{
    let batches = source.open(cancel.clone());
    stream::try_unfold(
        (batches, cancel, metrics),
        |(mut batches, cancel, metrics)| async move {
            if cancel.is_cancelled() {
                return Err(JoinError::Cancelled);
            }
            match batches.try_next().await.map_err(JoinError::source)? {
                Some(batch) => {
                    if let Some(metrics) = &metrics {
                        metrics.record_batch(batch.len(), batch.len());
                    }
                    Ok(Some((batch, (batches, cancel, metrics))))
                }
                None => Ok(None),
            }
        },
    )
    .boxed()
}

async fn process_batch<T, A>(
    drive: &mut Drive<T>,
    batch: Vec<T>,
) -> Result<Vec<(T, A)>, JoinError>
where
    T: Element,
    A: Send + Sync + 'static,
{
    // Fan out every layer over the raw batch; operations only ever see the
    // original items, never each other's output. The barrier completes when
    // all layers have; the first fault wins and drops its siblings.
    let cancel = drive.cancel.clone();
    let mut results: Vec<Vec<Slot>> = future::try_join_all(
        drive
            .layers
            .iter_mut()
            .map(|layer| layer.op.process_batch(&batch, &cancel)),
    )
    .await?;

    // Fold per item in declared layer order, regardless of which fetch
    // finished first.
    let mut pairs = Vec::with_capacity(batch.len());
    'fold: for (index, item) in batch.iter().enumerate() {
        let mut aggregate: Slot = Some(erased::boxed(item.clone()));
        for (stage, layer) in drive.layers.iter().enumerate() {
            let fetched = results[stage][index].take();
            aggregate = (layer.binder)(item, fetched, aggregate)?;
            if aggregate.is_none() {
                // The first absent aggregate abandons the remainder of the
                // batch, not just this item.
                debug!(
                    "absent aggregate at stage {stage}; batch truncated to {} of {} items",
                    pairs.len(),
                    batch.len()
                );
                break 'fold;
            }
        }
        let aggregate = aggregate.ok_or(JoinError::AbsentAggregate)?;
        pairs.push((item.clone(), erased::unbox::<A>(aggregate)?));
    }
    if let Some(metrics) = &drive.metrics {
        metrics.record_batch(batch.len(), pairs.len());
    }
    Ok(pairs)
}
