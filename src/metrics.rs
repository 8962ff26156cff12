//! Execution counters for pipeline enumerations.
//!
//! A [`MetricsCollector`] is a cheap `Arc` handle attached to a pipeline
//! descriptor with `with_metrics`. Counters accumulate across every
//! enumeration of that descriptor (and of descriptors derived from it), and
//! a [`snapshot`](MetricsCollector::snapshot) can be printed or exported as
//! JSON after the fact.
//!
//! # Example
//!
//! ```ignore
//! use batchflow::*;
//!
//! let metrics = MetricsCollector::new();
//! let pipeline = from_vec_batches(vec![vec![1, 2], vec![3]])
//!     .with_metrics(metrics.clone());
//!
//! let _ = pipeline.collect().await?;
//! metrics.snapshot().print();
//! ```

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters shared by every enumeration of a pipeline.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    items_in: AtomicU64,
    pairs_emitted: AtomicU64,
    items_truncated: AtomicU64,
}

impl MetricsCollector {
    /// Create a collector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_batch(&self, items_in: usize, emitted: usize) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        self.inner.items_in.fetch_add(items_in as u64, Ordering::Relaxed);
        self.inner
            .pairs_emitted
            .fetch_add(emitted as u64, Ordering::Relaxed);
        self.inner
            .items_truncated
            .fetch_add(items_in.saturating_sub(emitted) as u64, Ordering::Relaxed);
    }

    /// A point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.inner.batches.load(Ordering::Relaxed),
            items_in: self.inner.items_in.load(Ordering::Relaxed),
            pairs_emitted: self.inner.pairs_emitted.load(Ordering::Relaxed),
            items_truncated: self.inner.items_truncated.load(Ordering::Relaxed),
        }
    }
}

/// Frozen counter values from one [`MetricsCollector::snapshot`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Batches pulled from the root source and processed to completion.
    pub batches: u64,
    /// Items contained in those batches.
    pub items_in: u64,
    /// (item, aggregate) pairs emitted downstream.
    pub pairs_emitted: u64,
    /// Items dropped by short-circuit batch truncation.
    pub items_truncated: u64,
}

impl MetricsSnapshot {
    /// Render as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "batches": self.batches,
            "items_in": self.items_in,
            "pairs_emitted": self.pairs_emitted,
            "items_truncated": self.items_truncated,
        })
    }

    /// Print the counters to stdout.
    pub fn print(&self) {
        println!("Pipeline metrics:");
        println!("  batches:         {}", self.batches);
        println!("  items in:        {}", self.items_in);
        println!("  pairs emitted:   {}", self.pairs_emitted);
        println!("  items truncated: {}", self.items_truncated);
    }
}
