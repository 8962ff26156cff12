use crate::cancel::CancellationToken;
use crate::error::JoinError;
use crate::metrics::MetricsCollector;
use crate::node::JoinNode;
use crate::runner;
use crate::source::{BatchSource, SingleSource, StreamSource, VecSource};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::marker::PhantomData;
use std::sync::Arc;

/// Bound for every item, key, related and aggregate type flowing through a
/// pipeline.
pub trait Element: 'static + Send + Sync + Clone {}
impl<T> Element for T where T: 'static + Send + Sync + Clone {}

/// A pipeline of raw item batches, before any join stage is attached.
///
/// Definitions are persistent: cloning or attaching a join never mutates the
/// original, and every enumeration derives its own execution state, so one
/// definition can be enumerated many times, concurrently.
pub struct Batched<T> {
    pub(crate) source: Arc<dyn BatchSource<T>>,
    pub(crate) metrics: Option<MetricsCollector>,
}

impl<T> Clone for Batched<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            metrics: self.metrics.clone(),
        }
    }
}

/// Wrap a factory of batch streams (e.g. a paged remote query) as a
/// pipeline root. The factory runs once per enumeration.
pub fn from_batch_stream<T, S, F>(factory: F) -> Batched<T>
where
    T: Element,
    S: Stream<Item = anyhow::Result<Vec<T>>> + Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    Batched {
        source: Arc::new(StreamSource::new(factory)),
        metrics: None,
    }
}

/// Wrap in-memory batches as a pipeline root.
pub fn from_vec_batches<T: Element>(batches: Vec<Vec<T>>) -> Batched<T> {
    Batched {
        source: Arc::new(VecSource::new(batches)),
        metrics: None,
    }
}

/// Wrap a single value as a one-batch, one-item pipeline, so single-entity
/// flows go through the same join machinery as full queries.
pub fn from_single<T: Element>(value: T) -> Batched<T> {
    Batched {
        source: Arc::new(SingleSource::new(value)),
        metrics: None,
    }
}

impl<T: Element> Batched<T> {
    /// Attach an execution counter shared by all future enumerations of
    /// this definition and of definitions derived from it.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enumerate as a stream of batches.
    pub fn batches(&self) -> BoxStream<'static, Result<Vec<T>, JoinError>> {
        self.batches_with(CancellationToken::new())
    }

    /// Enumerate as a stream of batches, observing `cancel`.
    pub fn batches_with(
        &self,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<Vec<T>, JoinError>> {
        runner::run_root(Arc::clone(&self.source), cancel, self.metrics.clone())
    }

    /// Enumerate as a batch-flattened stream of individual items.
    pub fn stream(&self) -> BoxStream<'static, Result<T, JoinError>> {
        flatten_batches(self.batches())
    }

    /// Like [`stream`](Batched::stream), observing `cancel`.
    pub fn stream_with(&self, cancel: CancellationToken) -> BoxStream<'static, Result<T, JoinError>> {
        flatten_batches(self.batches_with(cancel))
    }

    /// Enumerate and materialize every item.
    pub async fn collect(&self) -> Result<Vec<T>, JoinError> {
        collect_batches(self.batches()).await
    }

    /// Like [`collect`](Batched::collect), observing `cancel`.
    pub async fn collect_with(&self, cancel: CancellationToken) -> Result<Vec<T>, JoinError> {
        collect_batches(self.batches_with(cancel)).await
    }
}

/// A pipeline whose items have been joined with related data, folding to an
/// aggregate of type `A` per item.
///
/// Like [`Batched`], this is an immutable definition; see the crate docs for
/// the enumeration model.
pub struct BatchedJoin<T, A> {
    pub(crate) node: Arc<JoinNode<T>>,
    pub(crate) metrics: Option<MetricsCollector>,
    pub(crate) _aggregate: PhantomData<fn() -> A>,
}

impl<T, A> Clone for BatchedJoin<T, A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<T, A> BatchedJoin<T, A>
where
    T: Element,
    A: Send + Sync + 'static,
{
    /// Attach an execution counter shared by all future enumerations of
    /// this definition and of definitions derived from it.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enumerate as a stream of folded `(item, aggregate)` batches.
    ///
    /// A batch may be shorter than its input batch: the fold abandons the
    /// remainder of a batch as soon as one item's aggregate comes up absent.
    pub fn batches(&self) -> BoxStream<'static, Result<Vec<(T, A)>, JoinError>> {
        self.batches_with(CancellationToken::new())
    }

    /// Like [`batches`](BatchedJoin::batches), observing `cancel`.
    pub fn batches_with(
        &self,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<Vec<(T, A)>, JoinError>> {
        runner::run_joined::<T, A>(Arc::clone(&self.node), cancel, self.metrics.clone())
    }

    /// Enumerate as a batch-flattened stream of individual pairs.
    pub fn stream(&self) -> BoxStream<'static, Result<(T, A), JoinError>> {
        flatten_batches(self.batches())
    }

    /// Like [`stream`](BatchedJoin::stream), observing `cancel`.
    pub fn stream_with(
        &self,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<(T, A), JoinError>> {
        flatten_batches(self.batches_with(cancel))
    }

    /// Enumerate and materialize every pair.
    pub async fn collect(&self) -> Result<Vec<(T, A)>, JoinError> {
        collect_batches(self.batches()).await
    }

    /// Like [`collect`](BatchedJoin::collect), observing `cancel`.
    pub async fn collect_with(&self, cancel: CancellationToken) -> Result<Vec<(T, A)>, JoinError> {
        collect_batches(self.batches_with(cancel)).await
    }

    /// Re-root: treat this pipeline's folded output as the batch source of a
    /// new pipeline, so further joins can be keyed off the aggregate
    /// produced so far.
    pub fn then_start_executing(&self) -> Batched<(T, A)>
    where
        A: Element,
    {
        Batched {
            source: Arc::new(RerootSource {
                inner: self.clone(),
            }),
            metrics: self.metrics.clone(),
        }
    }
}

/// Batch source backed by a fully-folded upstream pipeline.
struct RerootSource<T, A> {
    inner: BatchedJoin<T, A>,
}

impl<T, A> BatchSource<(T, A)> for RerootSource<T, A>
where
    T: Element,
    A: Element,
{
    fn open(&self, cancel: CancellationToken) -> BoxStream<'static, anyhow::Result<Vec<(T, A)>>> {
        self.inner
            .batches_with(cancel)
            .map(|result| result.map_err(anyhow::Error::new))
            .boxed()
    }
}

fn flatten_batches<V: Send + 'static>(
    batches: BoxStream<'static, Result<Vec<V>, JoinError>>,
) -> BoxStream<'static, Result<V, JoinError>> {
    batches
        .flat_map(|result| match result {
            Ok(batch) => stream::iter(batch.into_iter().map(Ok)).left_stream(),
            Err(err) => stream::iter([Err(err)]).right_stream(),
        })
        .boxed()
}

async fn collect_batches<V>(
    mut batches: BoxStream<'static, Result<Vec<V>, JoinError>>,
) -> Result<Vec<V>, JoinError> {
    let mut out = Vec::new();
    while let Some(batch) = batches.try_next().await? {
        out.extend(batch);
    }
    Ok(out)
}
