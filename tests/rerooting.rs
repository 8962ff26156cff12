use anyhow::Result;
use batchflow::testing::TableJoiner;
use batchflow::*;
use futures::StreamExt;

#[tokio::test]
async fn rerooted_pipeline_joins_off_the_prior_aggregate() -> Result<()> {
    let owners = TableJoiner::new([(1, "alice"), (2, "bob")]);
    let regions = TableJoiner::new([("alice", "north"), ("bob", "south")]);

    let pairs = from_vec_batches(vec![vec![1, 2]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .then_start_executing()
        .join_by_distinct_key(|pair: &(i32, &'static str)| pair.1, regions.joiner())
        .collect()
        .await?;

    assert_eq!(
        pairs,
        vec![((1, "alice"), "north"), ((2, "bob"), "south")]
    );
    Ok(())
}

#[tokio::test]
async fn reroot_preserves_batch_boundaries() -> Result<()> {
    let owners = TableJoiner::new([(1, "a"), (2, "b"), (3, "c")]);

    let mut batches = from_vec_batches(vec![vec![1, 2], vec![3]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .then_start_executing()
        .batches();

    assert_eq!(batches.next().await.unwrap()?, vec![(1, "a"), (2, "b")]);
    assert_eq!(batches.next().await.unwrap()?, vec![(3, "c")]);
    assert!(batches.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn rerooted_definitions_are_still_reusable() -> Result<()> {
    let owners = TableJoiner::new([(1, "a")]);

    let rerooted = from_vec_batches(vec![vec![1]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .then_start_executing();

    assert_eq!(rerooted.collect().await?, vec![(1, "a")]);
    assert_eq!(rerooted.collect().await?, vec![(1, "a")]);
    // The upstream pipeline executed once per downstream enumeration.
    assert_eq!(owners.request_count(), 2);
    Ok(())
}

#[tokio::test]
async fn inner_faults_pass_through_a_reroot_typed() -> Result<()> {
    let wrong_length = |items: Vec<i32>, _cancel: CancellationToken| async move {
        Ok::<_, anyhow::Error>(items.iter().map(|i| Some(*i)).skip(1).collect::<Vec<_>>())
    };

    let result = from_vec_batches(vec![vec![1, 2]])
        .join_by_value(wrong_length)
        .then_start_executing()
        .collect()
        .await;

    assert!(matches!(
        result,
        Err(JoinError::ValueJoinerLength {
            expected: 2,
            actual: 1
        })
    ));
    Ok(())
}
