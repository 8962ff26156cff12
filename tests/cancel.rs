use anyhow::Result;
use batchflow::testing::TableJoiner;
use batchflow::*;
use futures::StreamExt;

#[tokio::test]
async fn pre_cancelled_token_stops_before_the_first_batch() -> Result<()> {
    let owners = TableJoiner::new([(1, "a")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = from_vec_batches(vec![vec![1]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .collect_with(cancel)
        .await;

    assert!(matches!(result, Err(JoinError::Cancelled)));
    assert_eq!(owners.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelling_between_batches_stops_the_enumeration() -> Result<()> {
    let owners = TableJoiner::new([(1, "a"), (2, "b")]);
    let cancel = CancellationToken::new();

    let mut batches = from_vec_batches(vec![vec![1], vec![2]])
        .join_by_distinct_key(|k: &i32| *k, owners.joiner())
        .batches_with(cancel.clone());

    assert_eq!(batches.next().await.unwrap()?, vec![(1, "a")]);
    cancel.cancel();
    assert!(matches!(batches.next().await, Some(Err(JoinError::Cancelled))));
    assert!(batches.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn joiners_receive_the_enumeration_token() -> Result<()> {
    let observing = |keys: Vec<i32>, cancel: CancellationToken| {
        let pairs: Vec<anyhow::Result<(i32, Option<bool>)>> = keys
            .into_iter()
            .map(|k| Ok((k, Some(cancel.is_cancelled()))))
            .collect();
        futures::stream::iter(pairs)
    };

    let pairs = from_vec_batches(vec![vec![1]])
        .join_by_distinct_key(|k: &i32| *k, observing)
        .collect()
        .await?;

    // Token is live (not cancelled) while the joiner runs.
    assert_eq!(pairs, vec![(1, false)]);
    Ok(())
}

#[test]
fn child_tokens_observe_their_parent_but_not_vice_versa() {
    let parent = CancellationToken::new();
    let child = parent.child();
    assert!(!child.is_cancelled());
    parent.cancel();
    assert!(child.is_cancelled());

    let parent = CancellationToken::new();
    let child = parent.child();
    child.cancel();
    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());
}

#[tokio::test]
async fn tokenless_joiners_adapt_with_ignoring_cancel() -> Result<()> {
    let lookup = |keys: Vec<i32>| {
        let pairs: Vec<anyhow::Result<(i32, Option<i32>)>> =
            keys.into_iter().map(|k| Ok((k, Some(k + 100)))).collect();
        futures::stream::iter(pairs)
    };

    let pairs = from_vec_batches(vec![vec![1, 2]])
        .join_by_distinct_key(|k: &i32| *k, ignoring_cancel(lookup))
        .collect()
        .await?;

    assert_eq!(pairs, vec![(1, 101), (2, 102)]);
    Ok(())
}
