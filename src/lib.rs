//! # Batchflow
//!
//! **Batched asynchronous join pipelines** for Rust. Batchflow turns a lazy
//! stream of item batches into a chain of batched, cached, concurrently
//! executed enrichment stages: the building block for N+1-free loading of
//! related records (foreign-key lookups against a remote store, bulk
//! hydration, per-row RPC fan-in) without hand-rolling the caching and
//! orchestration every time.
//!
//! ## Key Features
//!
//! - **Persistent pipeline definitions** - immutable, clonable descriptors
//!   that can be enumerated many times, concurrently
//! - **Three join flavors** - distinct single-key, distinct multi-key, and
//!   raw-value passthrough
//! - **Per-enumeration caching** - each distinct-key stage fetches a key at
//!   most once per enumeration, with no negative caching
//! - **Concurrent fan-out** - all stages of a batch resolve at once; folding
//!   still happens in declared order
//! - **Strict ordering** - batches are sequential, output order matches
//!   input order
//! - **Cooperative cancellation** - one token threads through sources,
//!   stages and joiners
//! - **Re-rooting** - feed one pipeline's folded output into another as its
//!   batch source
//!
//! ## Quick Start
//!
//! ```ignore
//! use batchflow::*;
//!
//! // A paged query producing batches of orders.
//! let orders = from_batch_stream(|| order_store.paged_query());
//!
//! // Enrich each order with its customer and its items, resolved in bulk.
//! let enriched = orders
//!     .join_by_distinct_key(
//!         |order: &Order| order.customer_id,
//!         |ids, cancel| customer_store.lookup(ids, cancel),
//!     )
//!     .join_by_distinct_key_list(
//!         |order: &Order| order.item_ids.clone(),
//!         |ids, cancel| item_store.lookup(ids, cancel),
//!         |customer, items| (customer, items),
//!     );
//!
//! let mut rows = enriched.stream();
//! while let Some(row) = rows.next().await {
//!     let (order, (customer, items)) = row?;
//!     // ...
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipelines are lazy descriptors
//!
//! A [`Batched<T>`] (raw items) or [`BatchedJoin<T, A>`] (items folded to an
//! aggregate `A`) holds no execution state. Every enumeration (`batches()`,
//! `stream()`, `collect()`) snapshots the stage chain into a root-first
//! hierarchy and creates fresh stateful operations with fresh caches, so
//! nothing leaks between enumerations and branching one definition into
//! several downstream chains is free.
//!
//! ### Joins and folding
//!
//! The first join's aggregate is exactly the fetched value. Every subsequent
//! join supplies a `combine(prior, fetched)` that folds the new fetch into
//! the running aggregate. Stages race concurrently per batch, but folding
//! always walks the chain in declared order.
//!
//! ### Caching
//!
//! Distinct-key stages cache key → related for the lifetime of one
//! enumeration, first write wins. Keys the joiner never resolves are *not*
//! remembered as absent: they are asked for again on every later batch
//! that references them.
//!
//! ### Ordering and truncation
//!
//! Output pairs preserve input order, with one deliberate quirk: the moment
//! an item's aggregate comes up absent, the *rest of that batch* is dropped,
//! not just the item. Downstream code may rely on that; see
//! `tests/truncation.rs` before changing it.
//!
//! ### Errors and cancellation
//!
//! Missing data is never an error. Joiner and source faults terminate the
//! enumeration as [`JoinError::Joiner`] / [`JoinError::Source`]; the core
//! neither retries nor swallows. Cancellation is a distinct
//! [`JoinError::Cancelled`] outcome, checked before each batch and visible
//! to every joiner through its [`CancellationToken`].
//!
//! ## Module Overview
//!
//! - [`collection`] - pipeline facades, constructors, enumeration methods
//! - [`joins`] - the chain-building API
//! - [`source`] - the [`BatchSource`] contract for custom roots
//! - [`cancel`] - cooperative cancellation tokens
//! - [`error`] - the [`JoinError`] taxonomy
//! - [`metrics`] - execution counters
//! - [`testing`] - map-backed joiners and request recording for tests

pub mod cancel;
pub mod collection;
pub mod error;
pub mod joins;
pub mod metrics;
pub mod source;
pub mod testing;

mod erased;
mod node;
mod operation;
mod runner;

// General re-exports
pub use cancel::CancellationToken;
pub use collection::{Batched, BatchedJoin, Element, from_batch_stream, from_single, from_vec_batches};
pub use error::JoinError;
pub use joins::ignoring_cancel;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use source::BatchSource;
