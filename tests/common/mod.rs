use chain_gateway::db::schema;
use sqlx::PgPool;

/// Connects to a disposable Postgres database and makes sure it starts
/// from a clean schema. Mirrors the teacher's `setup_test_db` pattern:
/// tests that need a live database require `TEST_DATABASE_URL` in the
/// environment and fail fast with a clear message if it's absent, rather
/// than silently skipping.
pub async fn setup_test_db() -> PgPool {
    dotenv::from_filename(".env.test").ok();
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run the integration tests");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("failed to connect to the test database");

    cleanup_test_db(&pool).await;
    schema::initialize_database(&pool)
        .await
        .expect("failed to initialize schema in test database");

    pool
}

pub async fn cleanup_test_db(pool: &PgPool) {
    sqlx::query(
        "DROP TABLE IF EXISTS block, block_gql_asc, block_gql_desc,
                   block_height_by_block_hash, block_by_tx_id, poa,
                   transaction, tx_tag, tx_offset CASCADE",
    )
    .execute(pool)
    .await
    .expect("failed to drop tables while resetting test database");
}

/// Builds a node `Block` wire value with the given height/hash/parent and
/// a handful of tags, matching the upstream JSON shape from SPEC_FULL.md §3.
pub fn sample_block(height: i64, hash: &str, previous: Option<&str>, tx_ids: &[&str]) -> chain_gateway::node::Block {
    serde_json::from_value(serde_json::json!({
        "indep_hash": hash,
        "height": height,
        "previous_block": previous,
        "timestamp": 1_700_000_000 + height,
        "txs": tx_ids,
        "tags": [{"name": "Block-Tag", "value": "v1"}],
    }))
    .expect("sample block JSON matches the wire shape")
}

pub fn sample_transaction(id: &str, owner: &str, target: &str, data_size: i64) -> chain_gateway::node::Transaction {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "owner": owner,
        "target": target,
        "quantity": "100",
        "reward": "1",
        "data_root": "root",
        "data_size": data_size.to_string(),
        "signature": "sig",
        "last_tx": "",
        "format": 2,
        "tags": [{"name": "App-Name", "value": "test"}, {"name": "Type", "value": "tx"}],
    }))
    .expect("sample transaction JSON matches the wire shape")
}
