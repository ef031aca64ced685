//! Executes a `ProjectedBlock` against Postgres (SPEC_FULL.md §4.3). Every
//! statement is an idempotent upsert: re-writing the same block (as happens
//! after a fork rollback re-imports a height) converges to the same row
//! rather than erroring or duplicating.
//!
//! `Full` commits a whole block atomically (used by backfill, where deep
//! blocks tolerate a longer timeout). `Fast`/`Gql` skip the transaction
//! wrapper entirely and fan every per-table statement out concurrently
//! across the pool, trusting idempotence rather than atomicity to keep the
//! store consistent if the process dies mid-write (SPEC_FULL.md §4.3: "the
//! writer does not wrap the projected statements in a logged/ACID batch").

use crate::sync::projector::{PoaInsert, ProjectedBlock, ProjectedTransaction, TagInsert};
use futures::future::try_join_all;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("database error while writing block at height {height}: {source}")]
    Database {
        height: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("writing block at height {height} exceeded its {timeout_ms}ms execution profile timeout")]
    TimedOut { height: i64, timeout_ms: u64 },
}

/// Maps to the statement-timeout / consistency choices SPEC_FULL.md §4.3
/// asks for in place of Cassandra consistency levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProfile {
    /// Best-effort, no transaction wrapper: cheap scans (Doctor).
    Fast,
    /// No transaction wrapper, same timeout as `Fast`: query-side reads.
    Gql,
    /// Wraps the whole block in one transaction: all core writes.
    Full,
}

impl ExecutionProfile {
    fn timeout(self) -> Duration {
        match self {
            ExecutionProfile::Fast => Duration::from_secs(5),
            ExecutionProfile::Gql => Duration::from_secs(5),
            ExecutionProfile::Full => Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Writer {
    pool: PgPool,
}

type BoxedWrite<'a> = Pin<Box<dyn Future<Output = Result<(), sqlx::Error>> + Send + 'a>>;

impl Writer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn write_block(
        &self,
        projected: &ProjectedBlock,
        profile: ExecutionProfile,
    ) -> Result<(), WriterError> {
        let height = projected.block.height;
        match profile {
            ExecutionProfile::Full => self.write_block_transactional(projected, profile).await,
            ExecutionProfile::Fast | ExecutionProfile::Gql => {
                let fanout = build_fanout(&self.pool, projected);
                match tokio::time::timeout(profile.timeout(), try_join_all(fanout)).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(source)) => Err(WriterError::Database { height, source }),
                    Err(_) => Err(WriterError::TimedOut {
                        height,
                        timeout_ms: profile.timeout().as_millis() as u64,
                    }),
                }
            }
        }
    }

    async fn write_block_transactional(
        &self,
        projected: &ProjectedBlock,
        profile: ExecutionProfile,
    ) -> Result<(), WriterError> {
        let height = projected.block.height;
        let wrap = |source| WriterError::Database { height, source };

        let body = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            write_block_row(&mut tx, projected).await?;
            write_gql_rows(&mut tx, projected).await?;
            write_height_index(&mut tx, projected).await?;
            if let Some(poa) = &projected.poa {
                write_poa_row(&mut tx, poa).await?;
            }
            for tx_projection in &projected.transactions {
                write_transaction(&mut tx, tx_projection).await?;
            }

            tx.commit().await
        };

        match tokio::time::timeout(profile.timeout(), body).await {
            Ok(result) => result.map_err(wrap),
            Err(_) => Err(WriterError::TimedOut {
                height,
                timeout_ms: profile.timeout().as_millis() as u64,
            }),
        }
    }
}

/// Flattens one block's row set into a list of independent statement
/// futures, each borrowing the pool directly so sqlx is free to run them
/// on as many distinct connections as the pool has available.
fn build_fanout<'a>(pool: &'a PgPool, projected: &'a ProjectedBlock) -> Vec<BoxedWrite<'a>> {
    let block = &projected.block;
    let tags = serde_json::to_value(&block.tags).unwrap_or_else(|_| serde_json::json!([]));

    let mut fanout: Vec<BoxedWrite<'a>> = vec![
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO block (indep_hash, height, previous_block, block_timestamp, txs, tags)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (indep_hash) DO UPDATE SET
                     height = EXCLUDED.height,
                     previous_block = EXCLUDED.previous_block,
                     block_timestamp = EXCLUDED.block_timestamp,
                     txs = EXCLUDED.txs,
                     tags = EXCLUDED.tags",
            )
            .bind(&block.indep_hash)
            .bind(block.height)
            .bind(&block.previous_block)
            .bind(block.block_timestamp)
            .bind(&block.txs)
            .bind(tags)
            .execute(pool)
            .await
            .map(|_| ())
        }),
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO block_gql_asc (height, indep_hash, block_timestamp)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (partition_id, height, indep_hash) DO NOTHING",
            )
            .bind(projected.gql_asc.height)
            .bind(&projected.gql_asc.indep_hash)
            .bind(projected.gql_asc.block_timestamp)
            .execute(pool)
            .await
            .map(|_| ())
        }),
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO block_gql_desc (height, indep_hash, block_timestamp)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (partition_id, height, indep_hash) DO NOTHING",
            )
            .bind(projected.gql_desc.height)
            .bind(&projected.gql_desc.indep_hash)
            .bind(projected.gql_desc.block_timestamp)
            .execute(pool)
            .await
            .map(|_| ())
        }),
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO block_height_by_block_hash (block_hash, height)
                 VALUES ($1, $2)
                 ON CONFLICT (block_hash) DO UPDATE SET height = EXCLUDED.height",
            )
            .bind(&projected.height_by_hash.block_hash)
            .bind(projected.height_by_hash.height)
            .execute(pool)
            .await
            .map(|_| ())
        }),
    ];

    if let Some(poa) = &projected.poa {
        fanout.push(Box::pin(async move {
            sqlx::query(
                "INSERT INTO poa (block_hash, block_height, poa)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (block_hash) DO UPDATE SET
                     block_height = EXCLUDED.block_height,
                     poa = EXCLUDED.poa",
            )
            .bind(&poa.block_hash)
            .bind(poa.block_height)
            .bind(&poa.poa)
            .execute(pool)
            .await
            .map(|_| ())
        }));
    }

    for projection in &projected.transactions {
        let t = &projection.transaction;
        fanout.push(Box::pin(async move {
            sqlx::query(
                "INSERT INTO transaction (
                     id, block_height, block_indep_hash, block_timestamp, owner, target,
                     quantity, reward, data_root, data_size, signature, last_tx, tx_format, tag_count
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                 ON CONFLICT (id) DO UPDATE SET
                     block_height = EXCLUDED.block_height,
                     block_indep_hash = EXCLUDED.block_indep_hash,
                     block_timestamp = EXCLUDED.block_timestamp,
                     owner = EXCLUDED.owner,
                     target = EXCLUDED.target,
                     quantity = EXCLUDED.quantity,
                     reward = EXCLUDED.reward,
                     data_root = EXCLUDED.data_root,
                     data_size = EXCLUDED.data_size,
                     signature = EXCLUDED.signature,
                     last_tx = EXCLUDED.last_tx,
                     tx_format = EXCLUDED.tx_format,
                     tag_count = EXCLUDED.tag_count",
            )
            .bind(&t.id)
            .bind(t.block_height)
            .bind(&t.block_indep_hash)
            .bind(t.block_timestamp)
            .bind(&t.owner)
            .bind(&t.target)
            .bind(t.quantity)
            .bind(t.reward)
            .bind(&t.data_root)
            .bind(t.data_size)
            .bind(&t.signature)
            .bind(&t.last_tx)
            .bind(t.tx_format)
            .bind(t.tag_count)
            .execute(pool)
            .await
            .map(|_| ())
        }));

        let link = &projection.block_by_tx;
        fanout.push(Box::pin(async move {
            sqlx::query(
                "INSERT INTO block_by_tx_id (tx_id, block_height, block_indep_hash)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (tx_id) DO UPDATE SET
                     block_height = EXCLUDED.block_height,
                     block_indep_hash = EXCLUDED.block_indep_hash",
            )
            .bind(&link.tx_id)
            .bind(link.block_height)
            .bind(&link.block_indep_hash)
            .execute(pool)
            .await
            .map(|_| ())
        }));

        for tag in &projection.tags {
            fanout.push(Box::pin(write_tag_pool(pool, tag)));
        }

        if let Some(offset) = &projection.offset {
            fanout.push(Box::pin(async move {
                sqlx::query(
                    "INSERT INTO tx_offset (tx_id, \"offset\", size)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (tx_id) DO UPDATE SET
                         \"offset\" = EXCLUDED.\"offset\",
                         size = EXCLUDED.size",
                )
                .bind(&offset.tx_id)
                .bind(offset.offset)
                .bind(offset.size)
                .execute(pool)
                .await
                .map(|_| ())
            }));
        }
    }

    fanout
}

async fn write_tag_pool(pool: &PgPool, tag: &TagInsert) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tx_tag (name, value, tx_id, tag_index, next_tag_index)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (name, value, tx_id, tag_index) DO NOTHING",
    )
    .bind(&tag.name)
    .bind(&tag.value)
    .bind(&tag.tx_id)
    .bind(tag.tag_index)
    .bind(tag.next_tag_index)
    .execute(pool)
    .await
    .map(|_| ())
}

async fn write_block_row(
    tx: &mut Transaction<'_, Postgres>,
    projected: &ProjectedBlock,
) -> Result<(), sqlx::Error> {
    let block = &projected.block;
    let tags = serde_json::to_value(&block.tags).unwrap_or_else(|_| serde_json::json!([]));
    sqlx::query(
        "INSERT INTO block (indep_hash, height, previous_block, block_timestamp, txs, tags)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (indep_hash) DO UPDATE SET
             height = EXCLUDED.height,
             previous_block = EXCLUDED.previous_block,
             block_timestamp = EXCLUDED.block_timestamp,
             txs = EXCLUDED.txs,
             tags = EXCLUDED.tags",
    )
    .bind(&block.indep_hash)
    .bind(block.height)
    .bind(&block.previous_block)
    .bind(block.block_timestamp)
    .bind(&block.txs)
    .bind(tags)
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn write_gql_rows(
    tx: &mut Transaction<'_, Postgres>,
    projected: &ProjectedBlock,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO block_gql_asc (height, indep_hash, block_timestamp)
         VALUES ($1, $2, $3)
         ON CONFLICT (partition_id, height, indep_hash) DO NOTHING",
    )
    .bind(projected.gql_asc.height)
    .bind(&projected.gql_asc.indep_hash)
    .bind(projected.gql_asc.block_timestamp)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO block_gql_desc (height, indep_hash, block_timestamp)
         VALUES ($1, $2, $3)
         ON CONFLICT (partition_id, height, indep_hash) DO NOTHING",
    )
    .bind(projected.gql_desc.height)
    .bind(&projected.gql_desc.indep_hash)
    .bind(projected.gql_desc.block_timestamp)
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn write_height_index(
    tx: &mut Transaction<'_, Postgres>,
    projected: &ProjectedBlock,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO block_height_by_block_hash (block_hash, height)
         VALUES ($1, $2)
         ON CONFLICT (block_hash) DO UPDATE SET height = EXCLUDED.height",
    )
    .bind(&projected.height_by_hash.block_hash)
    .bind(projected.height_by_hash.height)
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn write_poa_row(
    tx: &mut Transaction<'_, Postgres>,
    poa: &PoaInsert,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO poa (block_hash, block_height, poa)
         VALUES ($1, $2, $3)
         ON CONFLICT (block_hash) DO UPDATE SET
             block_height = EXCLUDED.block_height,
             poa = EXCLUDED.poa",
    )
    .bind(&poa.block_hash)
    .bind(poa.block_height)
    .bind(&poa.poa)
    .execute(&mut **tx)
    .await
    .map(|_| ())
}

async fn write_transaction(
    tx: &mut Transaction<'_, Postgres>,
    projection: &ProjectedTransaction,
) -> Result<(), sqlx::Error> {
    let t = &projection.transaction;
    sqlx::query(
        "INSERT INTO transaction (
             id, block_height, block_indep_hash, block_timestamp, owner, target,
             quantity, reward, data_root, data_size, signature, last_tx, tx_format, tag_count
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (id) DO UPDATE SET
             block_height = EXCLUDED.block_height,
             block_indep_hash = EXCLUDED.block_indep_hash,
             block_timestamp = EXCLUDED.block_timestamp,
             owner = EXCLUDED.owner,
             target = EXCLUDED.target,
             quantity = EXCLUDED.quantity,
             reward = EXCLUDED.reward,
             data_root = EXCLUDED.data_root,
             data_size = EXCLUDED.data_size,
             signature = EXCLUDED.signature,
             last_tx = EXCLUDED.last_tx,
             tx_format = EXCLUDED.tx_format,
             tag_count = EXCLUDED.tag_count",
    )
    .bind(&t.id)
    .bind(t.block_height)
    .bind(&t.block_indep_hash)
    .bind(t.block_timestamp)
    .bind(&t.owner)
    .bind(&t.target)
    .bind(t.quantity)
    .bind(t.reward)
    .bind(&t.data_root)
    .bind(t.data_size)
    .bind(&t.signature)
    .bind(&t.last_tx)
    .bind(t.tx_format)
    .bind(t.tag_count)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO block_by_tx_id (tx_id, block_height, block_indep_hash)
         VALUES ($1, $2, $3)
         ON CONFLICT (tx_id) DO UPDATE SET
             block_height = EXCLUDED.block_height,
             block_indep_hash = EXCLUDED.block_indep_hash",
    )
    .bind(&projection.block_by_tx.tx_id)
    .bind(projection.block_by_tx.block_height)
    .bind(&projection.block_by_tx.block_indep_hash)
    .execute(&mut **tx)
    .await?;

    for tag in &projection.tags {
        sqlx::query(
            "INSERT INTO tx_tag (name, value, tx_id, tag_index, next_tag_index)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (name, value, tx_id, tag_index) DO NOTHING",
        )
        .bind(&tag.name)
        .bind(&tag.value)
        .bind(&tag.tx_id)
        .bind(tag.tag_index)
        .bind(tag.next_tag_index)
        .execute(&mut **tx)
        .await?;
    }

    if let Some(offset) = &projection.offset {
        sqlx::query(
            "INSERT INTO tx_offset (tx_id, \"offset\", size)
             VALUES ($1, $2, $3)
             ON CONFLICT (tx_id) DO UPDATE SET
                 \"offset\" = EXCLUDED.\"offset\",
                 size = EXCLUDED.size",
        )
        .bind(&offset.tx_id)
        .bind(offset.offset)
        .bind(offset.size)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_profile_uses_the_longest_timeout() {
        assert_eq!(ExecutionProfile::Full.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn fast_and_gql_profiles_share_the_short_timeout() {
        assert_eq!(ExecutionProfile::Fast.timeout(), Duration::from_secs(5));
        assert_eq!(ExecutionProfile::Gql.timeout(), Duration::from_secs(5));
    }
}
