//! Batch sources: the root of every pipeline hierarchy.
//!
//! A [`BatchSource`] produces a fresh, lazy stream of batches each time a
//! pipeline is enumerated. The source is the only layer of the hierarchy
//! without a join operation; its fold contribution is the identity.

use crate::cancel::CancellationToken;
use crate::collection::Element;
use anyhow::Result;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// A reusable producer of batch streams.
///
/// `open` is called once per enumeration and must return an independent
/// stream: pipeline definitions are enumerated many times, possibly
/// concurrently, and execution state never leaks between enumerations.
pub trait BatchSource<T>: Send + Sync {
    /// Open a fresh stream of batches for one enumeration.
    ///
    /// The token is the enumeration's cancellation token; sources backed by
    /// remote queries can observe it. Dropping the returned stream must
    /// abandon any in-flight work.
    fn open(&self, cancel: CancellationToken) -> BoxStream<'static, Result<Vec<T>>>;
}

/// Wraps a factory of batch streams (paged remote queries, channels, ...).
pub(crate) struct StreamSource<F> {
    factory: F,
}

impl<F> StreamSource<F> {
    pub(crate) fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<T, S, F> BatchSource<T> for StreamSource<F>
where
    S: Stream<Item = Result<Vec<T>>> + Send + 'static,
    F: Fn() -> S + Send + Sync,
{
    fn open(&self, _cancel: CancellationToken) -> BoxStream<'static, Result<Vec<T>>> {
        (self.factory)().boxed()
    }
}

/// In-memory batches, replayed per enumeration.
pub(crate) struct VecSource<T> {
    batches: Vec<Vec<T>>,
}

impl<T> VecSource<T> {
    pub(crate) fn new(batches: Vec<Vec<T>>) -> Self {
        Self { batches }
    }
}

impl<T: Element> BatchSource<T> for VecSource<T> {
    fn open(&self, _cancel: CancellationToken) -> BoxStream<'static, Result<Vec<T>>> {
        stream::iter(self.batches.clone().into_iter().map(Ok)).boxed()
    }
}

/// A single value as a one-batch, one-item sequence, so single-entity flows
/// compose with the same join machinery as full queries.
pub(crate) struct SingleSource<T> {
    value: T,
}

impl<T> SingleSource<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Element> BatchSource<T> for SingleSource<T> {
    fn open(&self, _cancel: CancellationToken) -> BoxStream<'static, Result<Vec<T>>> {
        stream::iter([Ok(vec![self.value.clone()])]).boxed()
    }
}
