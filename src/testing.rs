//! Testing utilities for batchflow pipelines.
//!
//! The heart of this module is [`TableJoiner`]: a `HashMap`-backed
//! distinct-key joiner that records every key set it is asked for, so tests
//! can pin down the caching contract (which keys were requested, on which
//! batch, and how often).
//!
//! # Example
//!
//! ```ignore
//! use batchflow::*;
//! use batchflow::testing::TableJoiner;
//!
//! let owners = TableJoiner::new([(1, "alice"), (2, "bob")]);
//! let pairs = from_vec_batches(vec![vec![1, 2], vec![2, 1]])
//!     .join_by_distinct_key(|id: &i32| *id, owners.joiner())
//!     .collect()
//!     .await?;
//!
//! // Both keys were cached after the first batch.
//! assert_eq!(owners.request_count(), 1);
//! ```

use crate::cancel::CancellationToken;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// A map-backed distinct-key joiner that records every request it serves.
///
/// Keys absent from the table are omitted from the reply entirely, matching
/// the joiner contract (no null-key placeholders). Rows can be
/// [`insert`](TableJoiner::insert)ed between batches to model data that
/// becomes resolvable later.
pub struct TableJoiner<K, R> {
    table: Arc<Mutex<HashMap<K, R>>>,
    requests: Arc<Mutex<Vec<Vec<K>>>>,
}

impl<K, R> TableJoiner<K, R>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(rows: impl IntoIterator<Item = (K, R)>) -> Self {
        Self {
            table: Arc::new(Mutex::new(rows.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add (or replace) a row; later requests will resolve it.
    pub fn insert(&self, key: K, row: R) {
        self.table.lock().unwrap().insert(key, row);
    }

    /// Every key set requested so far, in request order.
    pub fn requests(&self) -> Vec<Vec<K>> {
        self.requests.lock().unwrap().clone()
    }

    /// How many times the joiner has been invoked.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All requested keys, flattened in request order.
    pub fn requested_keys(&self) -> Vec<K> {
        self.requests.lock().unwrap().iter().flatten().cloned().collect()
    }

    /// A joiner closure for `join_by_distinct_key` /
    /// `join_by_distinct_key_list`.
    pub fn joiner(
        &self,
    ) -> impl Fn(Vec<K>, CancellationToken) -> BoxStream<'static, anyhow::Result<(K, Option<R>)>>
    + Send
    + Sync
    + 'static
    + use<K, R> {
        let table = Arc::clone(&self.table);
        let requests = Arc::clone(&self.requests);
        move |keys, _cancel| {
            requests.lock().unwrap().push(keys.clone());
            let table = table.lock().unwrap();
            let pairs: Vec<anyhow::Result<(K, Option<R>)>> = keys
                .into_iter()
                .filter_map(|key| table.get(&key).cloned().map(|row| Ok((key, Some(row)))))
                .collect();
            stream::iter(pairs).boxed()
        }
    }
}
