use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row shape of the canonical `block` table (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockRow {
    pub indep_hash: String,
    pub height: i64,
    pub previous_block: Option<String>,
    pub block_timestamp: i64,
}

/// Row shape of `transaction`, the canonical per-tx projection.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub block_height: i64,
    pub block_indep_hash: String,
    pub block_timestamp: i64,
    pub owner: Option<String>,
    pub target: Option<String>,
    pub quantity: Option<i64>,
    pub reward: Option<i64>,
    pub data_root: Option<String>,
    pub data_size: Option<i64>,
    pub signature: Option<String>,
    pub last_tx: Option<String>,
    pub tx_format: Option<i64>,
    pub tag_count: i32,
}

/// Row shape shared by `block_gql_asc`/`block_gql_desc` (SPEC_FULL.md §4.7,
/// Invariant 5: the two tables carry identical triples, differing only in
/// clustering order).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockGqlRow {
    pub height: i64,
    pub indep_hash: String,
    pub block_timestamp: i64,
}

/// Row shape of `tx_tag`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TxTagRow {
    pub name: String,
    pub value: String,
    pub tx_id: String,
    pub tag_index: i32,
    pub next_tag_index: Option<i32>,
}
