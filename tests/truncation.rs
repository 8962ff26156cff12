//! Pins the short-circuit truncation behavior: the first absent aggregate
//! abandons the remainder of its batch. This is load-bearing for downstream
//! consumers; changing it to a per-item skip must be a deliberate, visible
//! decision.

use anyhow::Result;
use batchflow::testing::TableJoiner;
use batchflow::*;

#[tokio::test]
async fn absent_item_truncates_the_rest_of_its_batch() -> Result<()> {
    // Keys 1 and 3 resolve; 2 does not. Item 3 is dropped although its key
    // resolved, because item 2 came first.
    let owners = TableJoiner::new([(1, "a"), (3, "c")]);

    let pairs = from_vec_batches(vec![vec![1, 2, 3]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .collect()
        .await?;

    assert_eq!(pairs, vec![(1, "a")]);
    Ok(())
}

#[tokio::test]
async fn truncation_only_affects_the_current_batch() -> Result<()> {
    let owners = TableJoiner::new([(1, "a"), (3, "c")]);

    let pairs = from_vec_batches(vec![vec![2, 1], vec![3]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .collect()
        .await?;

    // Batch 1 truncates at position 0 and emits nothing; batch 2 proceeds.
    assert_eq!(pairs, vec![(3, "c")]);
    Ok(())
}

#[tokio::test]
async fn truncation_still_caches_what_the_batch_fetched() -> Result<()> {
    let owners = TableJoiner::new([(1, "a"), (3, "c")]);

    let pairs = from_vec_batches(vec![vec![2, 3], vec![3]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .collect()
        .await?;

    assert_eq!(pairs, vec![(3, "c")]);
    // Key 3 was fetched (and cached) on the truncated batch already, so
    // batch 2 never reaches the joiner.
    assert_eq!(owners.requests(), vec![vec![2, 3]]);
    Ok(())
}

#[tokio::test]
async fn value_join_absence_truncates_too() -> Result<()> {
    // A first value join whose slot comes back absent hits the same
    // short-circuit as a distinct-key join.
    let spotty = |items: Vec<i32>, _cancel: CancellationToken| async move {
        Ok::<_, anyhow::Error>(
            items
                .into_iter()
                .map(|i| if i % 2 == 0 { Some(i * 10) } else { None })
                .collect::<Vec<_>>(),
        )
    };

    let pairs = from_vec_batches(vec![vec![2, 4, 5, 6]])
        .join_by_value(spotty)
        .collect()
        .await?;

    assert_eq!(pairs, vec![(2, 20), (4, 40)]);
    Ok(())
}
