//! Stateful join operations: the per-enumeration workers behind each stage.
//!
//! Every variant implements one contract: given a batch of raw items,
//! produce exactly one result slot per item, index-aligned with the input.
//! Key-based variants own a cache that lives for the whole enumeration and
//! is written only by their own `process_batch` call (batches are strictly
//! sequential, so no locking). A key the joiner never resolves is *not*
//! remembered as absent: it is requested again on every later batch that
//! references it.

use crate::cancel::CancellationToken;
use crate::erased::{self, Slot};
use crate::error::JoinError;
use crate::node::{KeyJoiner, ValueJoiner};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// One stage's batch resolver. `results.len() == items.len()`, order-aligned.
#[async_trait]
pub(crate) trait BatchOperation<T>: Send {
    async fn process_batch(
        &mut self,
        items: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<Slot>, JoinError>;
}

/// Distinct single-key join: dedup the batch's cache-miss keys, drain the
/// joiner's pair stream into the cache (first write wins), then answer every
/// item from the cache.
pub(crate) struct KeyDistinctOperation<T, K, R> {
    selector: Arc<dyn Fn(&T) -> K + Send + Sync>,
    joiner: KeyJoiner<K, R>,
    cache: HashMap<K, Option<R>>,
}

impl<T, K, R> KeyDistinctOperation<T, K, R> {
    pub(crate) fn new(
        selector: Arc<dyn Fn(&T) -> K + Send + Sync>,
        joiner: KeyJoiner<K, R>,
    ) -> Self {
        Self {
            selector,
            joiner,
            cache: HashMap::new(),
        }
    }
}

#[async_trait]
impl<T, K, R> BatchOperation<T> for KeyDistinctOperation<T, K, R>
where
    T: Send + Sync,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    async fn process_batch(
        &mut self,
        items: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<Slot>, JoinError> {
        if cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }
        let keys: Vec<K> = items.iter().map(|item| (self.selector)(item)).collect();
        let misses = cache_misses(keys.iter(), &self.cache);
        fetch_into_cache(&self.joiner, misses, cancel, &mut self.cache).await?;
        Ok(keys
            .into_iter()
            .map(|key| self.cache.get(&key).cloned().flatten().map(erased::boxed))
            .collect())
    }
}

/// Distinct multi-key join: like [`KeyDistinctOperation`], but each item maps
/// to an ordered key list and resolves to an equally ordered
/// `Vec<Option<R>>`. Deduplication runs over the flattened key set.
pub(crate) struct KeyListDistinctOperation<T, K, R> {
    selector: Arc<dyn Fn(&T) -> Vec<K> + Send + Sync>,
    joiner: KeyJoiner<K, R>,
    cache: HashMap<K, Option<R>>,
}

impl<T, K, R> KeyListDistinctOperation<T, K, R> {
    pub(crate) fn new(
        selector: Arc<dyn Fn(&T) -> Vec<K> + Send + Sync>,
        joiner: KeyJoiner<K, R>,
    ) -> Self {
        Self {
            selector,
            joiner,
            cache: HashMap::new(),
        }
    }
}

#[async_trait]
impl<T, K, R> BatchOperation<T> for KeyListDistinctOperation<T, K, R>
where
    T: Send + Sync,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    async fn process_batch(
        &mut self,
        items: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<Slot>, JoinError> {
        if cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }
        let key_lists: Vec<Vec<K>> = items.iter().map(|item| (self.selector)(item)).collect();
        let misses = cache_misses(key_lists.iter().flatten(), &self.cache);
        fetch_into_cache(&self.joiner, misses, cancel, &mut self.cache).await?;
        Ok(key_lists
            .into_iter()
            .map(|list| {
                let related: Vec<Option<R>> = list
                    .iter()
                    .map(|key| self.cache.get(key).cloned().flatten())
                    .collect();
                // The slot itself is always present; absence lives per key.
                Some(erased::boxed(related))
            })
            .collect())
    }
}

/// Value join: no keys, no cache. The joiner sees the full ordered batch on
/// every call and must return exactly one slot per item.
pub(crate) struct ValueOperation<T, R> {
    joiner: ValueJoiner<T, R>,
}

impl<T, R> ValueOperation<T, R> {
    pub(crate) fn new(joiner: ValueJoiner<T, R>) -> Self {
        Self { joiner }
    }
}

#[async_trait]
impl<T, R> BatchOperation<T> for ValueOperation<T, R>
where
    T: Clone + Send + Sync,
    R: Send + Sync + 'static,
{
    async fn process_batch(
        &mut self,
        items: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<Slot>, JoinError> {
        if cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }
        let fetched = (self.joiner)(items.to_vec(), cancel.clone())
            .await
            .map_err(JoinError::joiner)?;
        if fetched.len() != items.len() {
            return Err(JoinError::ValueJoinerLength {
                expected: items.len(),
                actual: fetched.len(),
            });
        }
        Ok(fetched
            .into_iter()
            .map(|related| related.map(erased::boxed))
            .collect())
    }
}

/// Distinct keys referenced by the batch that the cache cannot answer yet,
/// in first-reference order.
fn cache_misses<'a, K, R>(
    keys: impl Iterator<Item = &'a K>,
    cache: &HashMap<K, Option<R>>,
) -> Vec<K>
where
    K: Eq + Hash + Clone + 'a,
{
    let mut seen = HashSet::new();
    keys.filter(|key| !cache.contains_key(*key) && seen.insert((*key).clone()))
        .cloned()
        .collect()
}

/// Ask the joiner for the missing keys and drain its pair stream into the
/// cache. Skipped entirely when the batch is fully cached. A pair for an
/// already-cached key is ignored (first write wins).
async fn fetch_into_cache<K, R>(
    joiner: &KeyJoiner<K, R>,
    misses: Vec<K>,
    cancel: &CancellationToken,
    cache: &mut HashMap<K, Option<R>>,
) -> Result<(), JoinError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    if misses.is_empty() {
        trace!("batch fully served from cache, joiner not invoked");
        return Ok(());
    }
    debug!("requesting {} uncached keys", misses.len());
    let mut pairs = joiner(misses, cancel.clone());
    while let Some(pair) = pairs.next().await {
        let (key, related) = pair.map_err(JoinError::joiner)?;
        cache.entry(key).or_insert(related);
    }
    Ok(())
}
