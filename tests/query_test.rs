mod common;

use chain_gateway::query::{BlockQuery, SortOrder, TagFilter, TagQuery, TransactionQuery};
use chain_gateway::sync::type_adapter::time_uuid;
use chain_gateway::sync::{projector, ExecutionProfile, Writer};
use common::{sample_block, sample_transaction, setup_test_db};

async fn seed(pool: &sqlx::PgPool) {
    let writer = Writer::new(pool.clone());
    for height in 0_i64..=2 {
        let hash = format!("hash-{height}");
        let previous = (height > 0).then(|| format!("hash-{}", height - 1));
        let tx_id = format!("tx-{height}");
        let block = sample_block(height, &hash, previous.as_deref(), &[&tx_id]);
        let transaction = sample_transaction(&tx_id, "owner-shared", &format!("target-{height}"), 1);
        let projected = projector::project(&block, &[transaction]);
        writer.write_block(&projected, ExecutionProfile::Full).await.unwrap();
    }
}

/// `id`/`ids`/`tags` filters narrow the result set; an unfiltered query
/// returns everything within the default limit.
#[tokio::test]
async fn transaction_query_filters_by_id_and_tag() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let all = TransactionQuery::default().run(&pool).await.unwrap();
    assert_eq!(all.len(), 3);

    let by_id = TransactionQuery {
        id: Some("tx-1".to_string()),
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].id, "tx-1");

    let by_ids = TransactionQuery {
        ids: vec!["tx-0".to_string(), "tx-2".to_string()],
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();
    assert_eq!(by_ids.len(), 2);

    let by_tag = TransactionQuery {
        tags: vec![("App-Name".to_string(), "test".to_string())],
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();
    assert_eq!(by_tag.len(), 3);

    let by_to = TransactionQuery {
        to: Some("target-1".to_string()),
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();
    assert_eq!(by_to.len(), 1);
    assert_eq!(by_to[0].id, "tx-1");
}

/// `min_height`/`max_height` are a genuine range, not an equality check —
/// unlike `to`, which is scalar equality (SPEC_FULL.md §9, Open Question 2).
#[tokio::test]
async fn transaction_query_height_bounds_are_a_range() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let result = TransactionQuery {
        min_height: Some(1),
        max_height: Some(2),
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();

    assert_eq!(result.len(), 2);
    let mut heights: Vec<i64> = result.iter().map(|row| row.block_height).collect();
    heights.sort();
    assert_eq!(heights, vec![1, 2]);
}

/// `confirmed_only` constrains to non-negative block heights
/// (`status: "confirmed"` in SPEC_FULL.md §4.7).
#[tokio::test]
async fn transaction_query_confirmed_only_excludes_negative_heights() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let result = TransactionQuery {
        confirmed_only: true,
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();

    assert_eq!(result.len(), 3);
    assert!(result.iter().all(|row| row.block_height >= 0));
}

/// `since` converts the embedded timestamp and filters strictly before it
/// (SPEC_FULL.md §4.7, scenario §8.6). `seed` assigns block_timestamp
/// `1_700_000_000 + height`, so a cutoff at height 2's timestamp excludes
/// exactly that block.
#[tokio::test]
async fn transaction_query_since_filters_by_embedded_timestamp() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let cutoff = time_uuid(1_700_000_002);
    let result = TransactionQuery {
        since: Some(cutoff),
        ..Default::default()
    }
    .run(&pool)
    .await
    .unwrap();

    assert_eq!(result.len(), 2);
    assert!(result.iter().all(|row| row.block_timestamp < 1_700_000_002));
}

/// The standalone tag query returns a bare `tx_id` projection, not full
/// transaction rows (SPEC_FULL.md §4.7 "Tags"; scenario §8.5).
#[tokio::test]
async fn tag_query_returns_matching_tx_ids() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let tx_ids = TagQuery {
        filters: vec![TagFilter {
            name: "App-Name".to_string(),
            values: vec!["test".to_string()],
        }],
    }
    .run(&pool)
    .await
    .unwrap();

    let mut tx_ids = tx_ids;
    tx_ids.sort();
    assert_eq!(tx_ids, vec!["tx-0".to_string(), "tx-1".to_string(), "tx-2".to_string()]);
}

/// A tag name with no matching value returns no rows.
#[tokio::test]
async fn tag_query_with_no_match_returns_empty() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let tx_ids = TagQuery {
        filters: vec![TagFilter {
            name: "App-Name".to_string(),
            values: vec!["nonexistent".to_string()],
        }],
    }
    .run(&pool)
    .await
    .unwrap();

    assert!(tx_ids.is_empty());
}

/// Which physical table is read encodes the sort order; both directions
/// return the same rows.
#[tokio::test]
async fn block_query_reads_the_table_matching_its_sort_order() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let ascending = BlockQuery {
        sort: SortOrder::HeightAscending,
        ..BlockQuery::default()
    }
    .run(&pool)
    .await
    .unwrap();
    let descending = BlockQuery {
        sort: SortOrder::HeightDescending,
        ..BlockQuery::default()
    }
    .run(&pool)
    .await
    .unwrap();

    assert_eq!(ascending.len(), 3);
    assert_eq!(descending.len(), 3);

    let mut ascending_heights: Vec<i64> = ascending.iter().map(|b| b.height).collect();
    let mut descending_heights: Vec<i64> = descending.iter().map(|b| b.height).collect();
    ascending_heights.sort();
    descending_heights.sort();
    assert_eq!(ascending_heights, descending_heights);
}

/// A limit outside `1..=MAX_LIMIT` is rejected rather than silently
/// clamped.
#[tokio::test]
async fn transaction_query_rejects_an_out_of_range_limit() {
    let pool = setup_test_db().await;
    seed(&pool).await;

    let result = TransactionQuery {
        limit: Some(0),
        ..Default::default()
    }
    .run(&pool)
    .await;

    assert!(result.is_err());
}
