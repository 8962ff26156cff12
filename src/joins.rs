//! Chain-building API: attach join stages to a pipeline.
//!
//! Each builder wraps its receiver without mutating it (definitions are
//! persistent; branching off one intermediate pipeline several times is
//! legal and yields fully independent executions) and installs:
//! 1) a factory producing a fresh stateful operation per enumeration, and
//! 2) a binder that folds the stage's fetched slot into the running
//!    per-item aggregate.
//!
//! ## Available operations
//! - [`Batched::join_by_distinct_key`] / [`BatchedJoin::join_by_distinct_key`] -
//!   one key per item, deduplicated and cached per enumeration
//! - [`Batched::join_by_distinct_key_list`] / [`BatchedJoin::join_by_distinct_key_list`] -
//!   a key list per item, resolved to an aligned `Vec<Option<R>>`
//! - [`Batched::join_by_value`] / [`BatchedJoin::join_by_value`] -
//!   the raw batch handed to the joiner, no keys, no cache
//!
//! ### Notes
//! - The first join's aggregate is exactly the fetched value; subsequent
//!   joins fold with a caller-supplied `combine(prior, fetched)`.
//! - An absent fetch on a *first* distinct-key or value join truncates the
//!   remainder of that batch (see the crate docs); in subsequent joins,
//!   absence is the combiner's business.
//! - Joiners receive the enumeration's [`CancellationToken`]; wrap a
//!   tokenless closure with [`ignoring_cancel`].
//!
//! ## Examples
//! ```ignore
//! use batchflow::*;
//!
//! let rows = from_vec_batches(vec![vec![(1, "a"), (2, "b")]]);
//! let joined = rows
//!     .join_by_distinct_key(|row| row.0, |keys, _cancel| owners.lookup(keys))
//!     .join_by_distinct_key(
//!         |row| row.1,
//!         |keys, _cancel| labels.lookup(keys),
//!         |owner, label| (owner, label),
//!     );
//! let pairs = joined.collect().await?;
//! ```

use crate::cancel::CancellationToken;
use crate::collection::{Batched, BatchedJoin, Element};
use crate::erased;
use crate::error::JoinError;
use crate::node::{DynBinder, JoinNode, KeyJoiner, OpFactory, Upstream, ValueJoiner};
use crate::operation::{KeyDistinctOperation, KeyListDistinctOperation, ValueOperation};
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Adapt a tokenless joiner into the token-aware shape every builder
/// expects, ignoring the cancellation token.
pub fn ignoring_cancel<I, O, F>(joiner: F) -> impl Fn(I, CancellationToken) -> O
where
    F: Fn(I) -> O,
{
    move |input, _cancel| joiner(input)
}

/// The first join's aggregate is exactly the fetched value.
fn first_binder<T>() -> DynBinder<T> {
    Arc::new(|_value, fetched, _prior| Ok(fetched))
}

fn boxed_key_joiner<K, R, J, P>(joiner: J) -> KeyJoiner<K, R>
where
    J: Fn(Vec<K>, CancellationToken) -> P + Send + Sync + 'static,
    P: Stream<Item = anyhow::Result<(K, Option<R>)>> + Send + 'static,
{
    Arc::new(move |keys, cancel| joiner(keys, cancel).boxed())
}

fn boxed_value_joiner<T, R, J, F>(joiner: J) -> ValueJoiner<T, R>
where
    J: Fn(Vec<T>, CancellationToken) -> F + Send + Sync + 'static,
    F: Future<Output = anyhow::Result<Vec<Option<R>>>> + Send + 'static,
{
    Arc::new(move |items, cancel| joiner(items, cancel).boxed())
}

impl<T: Element> Batched<T> {
    /// Join each item with the record behind one key.
    ///
    /// `key_selector` derives the key; `joiner` receives the deduplicated
    /// set of keys not yet cached this enumeration and returns an async
    /// sequence of `(key, related)` pairs, in any order. Unresolved keys are
    /// simply omitted; they are requested again on the next batch that
    /// references them. The stage's aggregate is the related value itself;
    /// an item whose key never resolves truncates the batch it is in.
    pub fn join_by_distinct_key<K, R, S, J, P>(
        &self,
        key_selector: S,
        joiner: J,
    ) -> BatchedJoin<T, R>
    where
        K: Eq + Hash + Element,
        R: Element,
        S: Fn(&T) -> K + Send + Sync + 'static,
        J: Fn(Vec<K>, CancellationToken) -> P + Send + Sync + 'static,
        P: Stream<Item = anyhow::Result<(K, Option<R>)>> + Send + 'static,
    {
        let selector: Arc<dyn Fn(&T) -> K + Send + Sync> = Arc::new(key_selector);
        let joiner = boxed_key_joiner(joiner);
        let factory: OpFactory<T> = Arc::new(move || {
            Box::new(KeyDistinctOperation::new(
                Arc::clone(&selector),
                Arc::clone(&joiner),
            ))
        });
        BatchedJoin {
            node: Arc::new(JoinNode {
                upstream: Upstream::Source(Arc::clone(&self.source)),
                factory,
                binder: first_binder(),
            }),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }

    /// Join each item with the records behind an ordered list of keys.
    ///
    /// Deduplication and caching run over the flattened key set of the
    /// batch; the aggregate is a `Vec<Option<R>>` aligned to the item's key
    /// list, so per-key absence never truncates.
    pub fn join_by_distinct_key_list<K, R, S, J, P>(
        &self,
        keys_selector: S,
        joiner: J,
    ) -> BatchedJoin<T, Vec<Option<R>>>
    where
        K: Eq + Hash + Element,
        R: Element,
        S: Fn(&T) -> Vec<K> + Send + Sync + 'static,
        J: Fn(Vec<K>, CancellationToken) -> P + Send + Sync + 'static,
        P: Stream<Item = anyhow::Result<(K, Option<R>)>> + Send + 'static,
    {
        let selector: Arc<dyn Fn(&T) -> Vec<K> + Send + Sync> = Arc::new(keys_selector);
        let joiner = boxed_key_joiner(joiner);
        let factory: OpFactory<T> = Arc::new(move || {
            Box::new(KeyListDistinctOperation::new(
                Arc::clone(&selector),
                Arc::clone(&joiner),
            ))
        });
        BatchedJoin {
            node: Arc::new(JoinNode {
                upstream: Upstream::Source(Arc::clone(&self.source)),
                factory,
                binder: first_binder(),
            }),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }

    /// Join by handing the joiner the full ordered batch of items.
    ///
    /// No deduplication and no cache: the joiner runs on every batch and
    /// must return exactly one `Option<R>` per item, index-aligned. Any
    /// other length is a fatal
    /// [`ValueJoinerLength`](JoinError::ValueJoinerLength) contract
    /// violation for the enumeration.
    pub fn join_by_value<R, J, F>(&self, joiner: J) -> BatchedJoin<T, R>
    where
        R: Send + Sync + 'static,
        J: Fn(Vec<T>, CancellationToken) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<Vec<Option<R>>>> + Send + 'static,
    {
        let joiner = boxed_value_joiner(joiner);
        let factory: OpFactory<T> =
            Arc::new(move || Box::new(ValueOperation::new(Arc::clone(&joiner))));
        BatchedJoin {
            node: Arc::new(JoinNode {
                upstream: Upstream::Source(Arc::clone(&self.source)),
                factory,
                binder: first_binder(),
            }),
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
    /// Attach a further distinct-key join, folding with
    /// `combine(prior_aggregate, fetched)`.
    ///
    /// The fetch runs concurrently with every other stage of the pipeline
    /// over the same raw batch, but `combine` always runs in declared stage
    /// order. `fetched` is `None` when the key did not resolve; whether that
    /// is tolerated or escalated is entirely the combiner's decision.
    pub fn join_by_distinct_key<K, R, B, S, J, P, C>(
        &self,
        key_selector: S,
        joiner: J,
        combine: C,
    ) -> BatchedJoin<T, B>
    where
        K: Eq + Hash + Element,
        R: Element,
        B: Send + Sync + 'static,
        S: Fn(&T) -> K + Send + Sync + 'static,
        J: Fn(Vec<K>, CancellationToken) -> P + Send + Sync + 'static,
        P: Stream<Item = anyhow::Result<(K, Option<R>)>> + Send + 'static,
        C: Fn(A, Option<R>) -> B + Send + Sync + 'static,
    {
        let selector: Arc<dyn Fn(&T) -> K + Send + Sync> = Arc::new(key_selector);
        let joiner = boxed_key_joiner(joiner);
        let factory: OpFactory<T> = Arc::new(move || {
            Box::new(KeyDistinctOperation::new(
                Arc::clone(&selector),
                Arc::clone(&joiner),
            ))
        });
        let binder: DynBinder<T> = Arc::new(move |_value, fetched, prior| {
            let prior = erased::unbox::<A>(prior.ok_or(JoinError::AbsentAggregate)?)?;
            let fetched = erased::unbox_slot::<R>(fetched)?;
            Ok(Some(erased::boxed(combine(prior, fetched))))
        });
        BatchedJoin {
            node: Arc::new(JoinNode {
                upstream: Upstream::Join(Arc::clone(&self.node)),
                factory,
                binder,
            }),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }

    /// Attach a further distinct-key-list join, folding with
    /// `combine(prior_aggregate, fetched_list)`.
    pub fn join_by_distinct_key_list<K, R, B, S, J, P, C>(
        &self,
        keys_selector: S,
        joiner: J,
        combine: C,
    ) -> BatchedJoin<T, B>
    where
        K: Eq + Hash + Element,
        R: Element,
        B: Send + Sync + 'static,
        S: Fn(&T) -> Vec<K> + Send + Sync + 'static,
        J: Fn(Vec<K>, CancellationToken) -> P + Send + Sync + 'static,
        P: Stream<Item = anyhow::Result<(K, Option<R>)>> + Send + 'static,
        C: Fn(A, Vec<Option<R>>) -> B + Send + Sync + 'static,
    {
        let selector: Arc<dyn Fn(&T) -> Vec<K> + Send + Sync> = Arc::new(keys_selector);
        let joiner = boxed_key_joiner(joiner);
        let factory: OpFactory<T> = Arc::new(move || {
            Box::new(KeyListDistinctOperation::new(
                Arc::clone(&selector),
                Arc::clone(&joiner),
            ))
        });
        let binder: DynBinder<T> = Arc::new(move |_value, fetched, prior| {
            let prior = erased::unbox::<A>(prior.ok_or(JoinError::AbsentAggregate)?)?;
            let fetched =
                erased::unbox::<Vec<Option<R>>>(fetched.ok_or(JoinError::AbsentAggregate)?)?;
            Ok(Some(erased::boxed(combine(prior, fetched))))
        });
        BatchedJoin {
            node: Arc::new(JoinNode {
                upstream: Upstream::Join(Arc::clone(&self.node)),
                factory,
                binder,
            }),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }

    /// Attach a further value join, folding with
    /// `combine(prior_aggregate, fetched)`.
    pub fn join_by_value<R, B, J, F, C>(&self, joiner: J, combine: C) -> BatchedJoin<T, B>
    where
        R: Send + Sync + 'static,
        B: Send + Sync + 'static,
        J: Fn(Vec<T>, CancellationToken) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<Vec<Option<R>>>> + Send + 'static,
        C: Fn(A, Option<R>) -> B + Send + Sync + 'static,
    {
        let joiner = boxed_value_joiner(joiner);
        let factory: OpFactory<T> =
            Arc::new(move || Box::new(ValueOperation::new(Arc::clone(&joiner))));
        let binder: DynBinder<T> = Arc::new(move |_value, fetched, prior| {
            let prior = erased::unbox::<A>(prior.ok_or(JoinError::AbsentAggregate)?)?;
            let fetched = erased::unbox_slot::<R>(fetched)?;
            Ok(Some(erased::boxed(combine(prior, fetched))))
        });
        BatchedJoin {
            node: Arc::new(JoinNode {
                upstream: Upstream::Join(Arc::clone(&self.node)),
                factory,
                binder,
            }),
            metrics: self.metrics.clone(),
            _aggregate: PhantomData,
        }
    }
}
