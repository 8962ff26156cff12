use anyhow::Result;
use batchflow::testing::TableJoiner;
use batchflow::*;
use futures::StreamExt;
use std::time::Duration;

#[tokio::test]
async fn join_associates_in_input_order() -> Result<()> {
    let owners = TableJoiner::new((0..10).map(|k| (k, format!("owner-{k}"))));

    let items: Vec<i64> = (0..50).collect();
    let batches: Vec<Vec<i64>> = items.chunks(8).map(|c| c.to_vec()).collect();

    let pairs = from_vec_batches(batches)
        .join_by_distinct_key(|item: &i64| item % 10, owners.joiner())
        .collect()
        .await?;

    assert_eq!(pairs.len(), 50);
    for (index, (item, owner)) in pairs.iter().enumerate() {
        assert_eq!(*item, index as i64);
        assert_eq!(*owner, format!("owner-{}", item % 10));
    }
    Ok(())
}

#[tokio::test]
async fn fold_runs_in_declared_order_not_completion_order() -> Result<()> {
    // Stage A resolves slowly, stage B instantly; the combine must still see
    // A's value as the prior aggregate.
    let slow = |keys: Vec<i64>, _cancel: CancellationToken| {
        futures::stream::iter(keys).then(|k| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, anyhow::Error>((k, Some(format!("a{k}"))))
        })
    };
    let fast = TableJoiner::new((0..4i64).map(|k| (k, format!("b{k}"))));

    let pairs = from_vec_batches(vec![vec![0i64, 1, 2, 3]])
        .join_by_distinct_key(|item: &i64| *item, slow)
        .join_by_distinct_key(
            |item: &i64| *item,
            fast.joiner(),
            |a: String, b: Option<String>| format!("{a}+{}", b.unwrap()),
        )
        .collect()
        .await?;

    assert_eq!(pairs.len(), 4);
    for (item, aggregate) in pairs {
        assert_eq!(aggregate, format!("a{item}+b{item}"));
    }
    Ok(())
}

#[tokio::test]
async fn key_list_join_aligns_related_to_each_items_keys() -> Result<()> {
    let tags = TableJoiner::new([(10, "x"), (20, "y")]);

    let pairs = from_vec_batches(vec![vec![vec![10, 30, 20], vec![20, 20]]])
        .join_by_distinct_key_list(|item: &Vec<i32>| item.clone(), tags.joiner())
        .collect()
        .await?;

    assert_eq!(pairs[0].1, vec![Some("x"), None, Some("y")]);
    assert_eq!(pairs[1].1, vec![Some("y"), Some("y")]);
    // Deduplication runs over the batch's flattened key set.
    assert_eq!(tags.requests(), vec![vec![10, 30, 20]]);
    Ok(())
}

#[tokio::test]
async fn subsequent_join_absence_is_left_to_the_combiner() -> Result<()> {
    let first = TableJoiner::new([(1, "a"), (2, "b")]);
    let second = TableJoiner::new([(1, "x")]);

    let pairs = from_vec_batches(vec![vec![1, 2]])
        .join_by_distinct_key(|k: &i32| *k, first.joiner())
        .join_by_distinct_key(
            |k: &i32| *k,
            second.joiner(),
            |a: &'static str, b: Option<&'static str>| (a, b),
        )
        .collect()
        .await?;

    assert_eq!(pairs, vec![(1, ("a", Some("x"))), (2, ("b", None))]);
    Ok(())
}

#[tokio::test]
async fn joiner_faults_terminate_the_enumeration() -> Result<()> {
    let failing = |_keys: Vec<i32>, _cancel: CancellationToken| {
        futures::stream::iter([Err::<(i32, Option<&'static str>), anyhow::Error>(
            anyhow::anyhow!("store offline"),
        )])
    };

    let result = from_vec_batches(vec![vec![1]])
        .join_by_distinct_key(|k: &i32| *k, failing)
        .collect()
        .await;

    match result {
        Err(JoinError::Joiner(err)) => assert_eq!(err.to_string(), "store offline"),
        other => panic!("expected joiner fault, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn pairs_stream_flattens_batches() -> Result<()> {
    let owners = TableJoiner::new([(1, "a"), (2, "b"), (3, "c")]);

    let mut rows = from_vec_batches(vec![vec![1, 2], vec![3]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .stream();

    let mut seen = Vec::new();
    while let Some(row) = rows.next().await {
        seen.push(row?);
    }
    assert_eq!(seen, vec![(1, "a"), (2, "b"), (3, "c")]);
    Ok(())
}
