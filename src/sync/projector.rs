//! Projects one upstream block into the row set for every denormalized
//! table of SPEC_FULL.md §3. Pure data transform — no I/O; the Writer
//! (`sync::writer`) executes the statements this module produces.

use crate::node;
use crate::sync::type_adapter::{tag_set, to_long};

/// Non-null-filtered columns for the `block` table (SPEC_FULL.md §4.2:
/// "only columns with non-empty values are included").
#[derive(Debug, Clone)]
pub struct BlockInsert {
    pub indep_hash: String,
    pub height: i64,
    pub previous_block: Option<String>,
    pub block_timestamp: i64,
    pub txs: Vec<String>,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct BlockGqlInsert {
    pub height: i64,
    pub indep_hash: String,
    pub block_timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct HeightByHashInsert {
    pub block_hash: String,
    pub height: i64,
}

#[derive(Debug, Clone)]
pub struct PoaInsert {
    pub block_hash: String,
    pub block_height: i64,
    pub poa: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct BlockByTxInsert {
    pub tx_id: String,
    pub block_height: i64,
    pub block_indep_hash: String,
}

/// A `tx_tag` row. `next_tag_index` is `None` only for the last tag on a
/// transaction, enabling forward-linked scans (SPEC_FULL.md §4.2).
#[derive(Debug, Clone)]
pub struct TagInsert {
    pub name: String,
    pub value: String,
    pub tx_id: String,
    pub tag_index: i32,
    pub next_tag_index: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct OffsetInsert {
    pub tx_id: String,
    pub offset: i64,
    pub size: i64,
}

/// Non-null-filtered columns for a `transaction` row.
#[derive(Debug, Clone)]
pub struct TransactionInsert {
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

#[derive(Debug, Clone)]
pub struct ProjectedTransaction {
    pub transaction: TransactionInsert,
    pub tags: Vec<TagInsert>,
    pub offset: Option<OffsetInsert>,
    pub block_by_tx: BlockByTxInsert,
}

#[derive(Debug, Clone)]
pub struct ProjectedBlock {
    pub block: BlockInsert,
    pub gql_asc: BlockGqlInsert,
    pub gql_desc: BlockGqlInsert,
    pub height_by_hash: HeightByHashInsert,
    pub poa: Option<PoaInsert>,
    pub transactions: Vec<ProjectedTransaction>,
}

/// Projects an upstream block plus its resolved transactions into the full
/// row set for all nine tables.
pub fn project(block: &node::Block, transactions: &[node::Transaction]) -> ProjectedBlock {
    let height = to_long(&block.height);
    let timestamp = to_long(&block.timestamp);
    let block_tags: Vec<(String, String)> = block
        .tags
        .iter()
        .map(|t| (t.name.clone(), t.value.clone()))
        .collect();

    let block_insert = BlockInsert {
        indep_hash: block.indep_hash.clone(),
        height,
        previous_block: non_empty(block.previous_block.clone()),
        block_timestamp: timestamp,
        txs: block.txs.clone(),
        tags: tag_set(&block_tags),
    };

    let gql_asc = BlockGqlInsert {
        height,
        indep_hash: block.indep_hash.clone(),
        block_timestamp: timestamp,
    };
    let gql_desc = gql_asc.clone();

    let height_by_hash = HeightByHashInsert {
        block_hash: block.indep_hash.clone(),
        height,
    };

    let poa = block.poa.as_ref().map(|poa| PoaInsert {
        block_hash: block.indep_hash.clone(),
        block_height: height,
        poa: serde_json::Value::Object(poa.fields.clone()),
    });

    let projected_transactions = transactions
        .iter()
        .map(|tx| project_transaction(tx, height, &block.indep_hash, timestamp))
        .collect();

    ProjectedBlock {
        block: block_insert,
        gql_asc,
        gql_desc,
        height_by_hash,
        poa,
        transactions: projected_transactions,
    }
}

fn project_transaction(
    tx: &node::Transaction,
    block_height: i64,
    block_indep_hash: &str,
    block_timestamp: i64,
) -> ProjectedTransaction {
    let data_size = tx.data_size.as_ref().map(to_long).unwrap_or(0);

    let tag_count = tx.tags.len() as i32;
    let last_index = tx.tags.len().saturating_sub(1);
    let tags = tx
        .tags
        .iter()
        .enumerate()
        .map(|(i, tag)| TagInsert {
            name: tag.name.clone(),
            value: tag.value.clone(),
            tx_id: tx.id.clone(),
            tag_index: i as i32,
            next_tag_index: if i == last_index {
                None
            } else {
                Some(i as i32 + 1)
            },
        })
        .collect();

    // tx_offset is emitted only when data_size > 0 (SPEC_FULL.md §4.2).
    let offset = if data_size > 0 {
        Some(OffsetInsert {
            tx_id: tx.id.clone(),
            offset: 0,
            size: data_size,
        })
    } else {
        None
    };

    let transaction = TransactionInsert {
        id: tx.id.clone(),
        block_height,
        block_indep_hash: block_indep_hash.to_string(),
        block_timestamp,
        owner: non_empty(tx.owner.clone()),
        target: non_empty(tx.target.clone()),
        quantity: tx.quantity.as_ref().map(to_long),
        reward: tx.reward.as_ref().map(to_long),
        data_root: non_empty(tx.data_root.clone()),
        data_size: Some(data_size),
        signature: non_empty(tx.signature.clone()),
        last_tx: non_empty(tx.last_tx.clone()),
        tx_format: tx.format.as_ref().map(to_long),
        tag_count,
    };

    let block_by_tx = BlockByTxInsert {
        tx_id: tx.id.clone(),
        block_height,
        block_indep_hash: block_indep_hash.to_string(),
    };

    ProjectedTransaction {
        transaction,
        tags,
        offset,
        block_by_tx,
    }
}

/// Non-null filtering (SPEC_FULL.md §4.2): an empty string is treated the
/// same as an absent value, so it's excluded from the insert rather than
/// written as `''`.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Block, Tag, Transaction};
    use serde_json::json;

    fn sample_block(height: i64, indep_hash: &str, previous_block: Option<&str>) -> Block {
        Block {
            indep_hash: indep_hash.to_string(),
            height: json!(height),
            previous_block: previous_block.map(str::to_string),
            timestamp: json!(1_700_000_000 + height),
            txs: vec![],
            tags: vec![
                Tag {
                    name: "App".to_string(),
                    value: "X".to_string(),
                },
                Tag {
                    name: "App".to_string(),
                    value: "X".to_string(),
                },
            ],
            poa: None,
            extra: Default::default(),
        }
    }

    fn sample_tx(id: &str, tags: Vec<(&str, &str)>, data_size: Option<i64>) -> Transaction {
        Transaction {
            id: id.to_string(),
            owner: Some("owner".to_string()),
            target: Some("".to_string()),
            quantity: Some(json!("0")),
            reward: Some(json!(1234)),
            data_root: None,
            data_size: data_size.map(|n| json!(n)),
            signature: Some("sig".to_string()),
            last_tx: None,
            format: Some(json!(2)),
            tags: tags
                .into_iter()
                .map(|(n, v)| Tag {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            extra: Default::default(),
        }
    }

    #[test]
    fn block_tags_collapse_into_a_deduplicated_set() {
        let block = sample_block(5, "hash5", Some("hash4"));
        let projected = project(&block, &[]);
        assert_eq!(
            projected.block.tags,
            vec![("App".to_string(), "X".to_string())]
        );
    }

    #[test]
    fn empty_target_is_treated_as_absent() {
        let block = sample_block(1, "hash1", None);
        let tx = sample_tx("tx1", vec![], None);
        let projected = project(&block, &[tx]);
        assert_eq!(projected.transactions[0].transaction.target, None);
    }

    #[test]
    fn tag_rows_are_forward_linked_with_last_index_nulled() {
        let block = sample_block(1, "hash1", None);
        let tx = sample_tx("tx1", vec![("App", "X"), ("Type", "tx")], None);
        let projected = project(&block, &[tx]);
        let tags = &projected.transactions[0].tags;
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag_index, 0);
        assert_eq!(tags[0].next_tag_index, Some(1));
        assert_eq!(tags[1].tag_index, 1);
        assert_eq!(tags[1].next_tag_index, None);
        assert_eq!(projected.transactions[0].transaction.tag_count, 2);
    }

    #[test]
    fn empty_tag_list_yields_no_tag_rows_and_zero_count() {
        let block = sample_block(1, "hash1", None);
        let tx = sample_tx("tx1", vec![], None);
        let projected = project(&block, &[tx]);
        assert!(projected.transactions[0].tags.is_empty());
        assert_eq!(projected.transactions[0].transaction.tag_count, 0);
    }

    #[test]
    fn zero_data_size_produces_no_offset_row() {
        let block = sample_block(1, "hash1", None);
        let tx = sample_tx("tx1", vec![], Some(0));
        let projected = project(&block, &[tx]);
        assert!(projected.transactions[0].offset.is_none());
    }

    #[test]
    fn positive_data_size_produces_an_offset_row() {
        let block = sample_block(1, "hash1", None);
        let tx = sample_tx("tx1", vec![], Some(2048));
        let projected = project(&block, &[tx]);
        let offset = projected.transactions[0].offset.as_ref().unwrap();
        assert_eq!(offset.size, 2048);
    }

    #[test]
    fn gql_asc_and_desc_carry_identical_triples() {
        let block = sample_block(7, "hash7", Some("hash6"));
        let projected = project(&block, &[]);
        assert_eq!(projected.gql_asc.height, projected.gql_desc.height);
        assert_eq!(projected.gql_asc.indep_hash, projected.gql_desc.indep_hash);
        assert_eq!(
            projected.gql_asc.block_timestamp,
            projected.gql_desc.block_timestamp
        );
    }

    #[test]
    fn block_by_tx_points_at_containing_block() {
        let block = sample_block(3, "hash3", Some("hash2"));
        let tx = sample_tx("tx3", vec![], None);
        let projected = project(&block, &[tx]);
        let link = &projected.transactions[0].block_by_tx;
        assert_eq!(link.block_height, 3);
        assert_eq!(link.block_indep_hash, "hash3");
    }
}
