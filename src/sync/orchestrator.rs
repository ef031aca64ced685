//! Drives the sync lifecycle: backfill from genesis (or from wherever the
//! database already reached) to the node's current height, then polls for
//! new blocks forever, resolving forks as they're detected (SPEC_FULL.md
//! §4.4). REDESIGN FLAGS: process-wide mutable globals are replaced here
//! by a single `SyncState` of atomics, read and written from any task
//! without a lock on the happy path.

use crate::config::{Settings, SyncSettings};
use crate::metrics::Metrics;
use crate::node::NodeClient;
use crate::sync::worker_pool::{Job, WorkerPool};
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Deepest a fork rollback will walk before giving up. A legitimate reorg
/// on this system's target chains is a handful of blocks; anything past
/// this is treated as a misconfiguration (wrong node, corrupted state)
/// rather than something to silently repair.
const MAX_FORK_DEPTH: i64 = 1024;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("node request failed: {0}")]
    Node(#[from] anyhow::Error),
    #[error(
        "fork rollback exceeded the safety limit of {MAX_FORK_DEPTH} blocks without finding a common ancestor"
    )]
    ForkTooDeep,
    #[error("failed to enqueue import job: worker pool channel closed")]
    QueueClosed,
}

/// Snapshot of where sync currently stands, readable from any task without
/// blocking a writer.
#[derive(Debug)]
pub struct SyncState {
    top_hash: RwLock<Option<String>>,
    top_height: AtomicI64,
    gateway_height: AtomicI64,
    current_height: AtomicI64,
    is_paused: AtomicBool,
    is_polling_started: AtomicBool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            top_hash: RwLock::new(None),
            top_height: AtomicI64::new(-1),
            gateway_height: AtomicI64::new(-1),
            current_height: AtomicI64::new(-1),
            is_paused: AtomicBool::new(false),
            is_polling_started: AtomicBool::new(false),
        }
    }
}

impl SyncState {
    pub fn top_hash(&self) -> Option<String> {
        self.top_hash.read().expect("top_hash lock poisoned").clone()
    }

    fn set_top(&self, hash: String, height: i64) {
        *self.top_hash.write().expect("top_hash lock poisoned") = Some(hash);
        self.top_height.store(height, Ordering::SeqCst);
    }

    pub fn current_height(&self) -> i64 {
        self.current_height.load(Ordering::SeqCst)
    }

    pub fn gateway_height(&self) -> i64 {
        self.gateway_height.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.is_paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.is_paused.store(false, Ordering::SeqCst);
    }

    pub fn is_polling_started(&self) -> bool {
        self.is_polling_started.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    state: Arc<SyncState>,
    node: NodeClient,
    pool: PgPool,
    worker_pool: WorkerPool,
    sync_settings: SyncSettings,
    metrics: Metrics,
}

impl Orchestrator {
    pub fn new(
        settings: &Settings,
        node: NodeClient,
        pool: PgPool,
        worker_pool: WorkerPool,
        metrics: Metrics,
    ) -> Self {
        Self {
            state: Arc::new(SyncState::default()),
            node,
            pool,
            worker_pool,
            sync_settings: settings.sync.clone(),
            metrics,
        }
    }

    pub fn state(&self) -> Arc<SyncState> {
        Arc::clone(&self.state)
    }

    /// Backfills from `get_max_height_block` (or genesis) to the node's
    /// current height, honoring `development_sync_length` as an upper
    /// bound on how many blocks this run will import (SPEC_FULL.md §9).
    pub async fn start_sync(&self) -> Result<(), OrchestratorError> {
        let node_info = self
            .node
            .get_node_info()
            .await?
            .ok_or_else(|| anyhow::anyhow!("node unavailable during initial sync"))?;
        self.state.gateway_height.store(node_info.height as i64, Ordering::SeqCst);

        let resume_height = self.get_max_height_block().await?.map(|h| h + 1).unwrap_or(0);

        let mut target_height = node_info.height as i64;
        if let Some(limit) = self.sync_settings.development_sync_length {
            target_height = target_height.min(resume_height + limit as i64 - 1);
        }

        info!(resume_height, target_height, "starting backfill");
        let hash_list = self.node.get_hash_list().await?;
        for height in resume_height..=target_height {
            let Some(hash) = hash_list.get(height as usize) else {
                warn!(height, "no hash available for height, stopping backfill");
                break;
            };
            self.worker_pool
                .submit(Job {
                    height,
                    hash: hash.clone(),
                })
                .await
                .map_err(|_| OrchestratorError::QueueClosed)?;
            self.state.current_height.store(height, Ordering::SeqCst);
            self.metrics.record_sync_progress(height, target_height);
        }

        if let Some(top_hash) = hash_list.get(target_height as usize) {
            self.state.set_top(top_hash.clone(), target_height);
        }

        Ok(())
    }

    /// `block_gql_desc` is ordered by height descending, so its first row
    /// is the highest block this system has ever persisted (SPEC_FULL.md
    /// §9, Open Question 1).
    async fn get_max_height_block(&self) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT height FROM block_gql_desc ORDER BY height DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
    }

    /// Polls the node on a fixed interval forever, importing any new
    /// blocks and resolving forks as they appear. Never returns under
    /// normal operation; the caller is expected to run this in its own
    /// task and select it against a shutdown signal.
    pub async fn start_polling(&self) -> Result<(), OrchestratorError> {
        self.state.is_polling_started.store(true, Ordering::SeqCst);
        let delay = std::time::Duration::from_secs(self.sync_settings.polltime_delay_seconds);

        loop {
            tokio::time::sleep(delay).await;
            if self.state.is_paused() {
                continue;
            }

            let Some(node_info) = self.node.get_node_info().await? else {
                warn!("node unavailable during poll, will retry next tick");
                continue;
            };
            self.state.gateway_height.store(node_info.height as i64, Ordering::SeqCst);

            if node_info.height as i64 <= self.state.top_height.load(Ordering::SeqCst) {
                continue;
            }

            let new_block = self.node.fetch_block_by_hash(&node_info.current).await?;
            let new_height = crate::sync::type_adapter::to_long(&new_block.height);

            let is_continuation = new_block
                .previous_block
                .as_deref()
                .map(|prev| Some(prev.to_string()) == self.state.top_hash())
                .unwrap_or(new_height == 0);

            if !is_continuation {
                warn!(
                    new_height,
                    expected_parent = ?self.state.top_hash(),
                    actual_parent = ?new_block.previous_block,
                    "fork detected, resolving"
                );
                self.resolve_fork(&new_block).await?;
            }

            self.worker_pool
                .submit(Job {
                    height: new_height,
                    hash: node_info.current.clone(),
                })
                .await
                .map_err(|_| OrchestratorError::QueueClosed)?;
            self.state.set_top(node_info.current, new_height);
            self.state.current_height.store(new_height, Ordering::SeqCst);
            self.metrics.record_block_imported();
        }
    }

    /// Walks `previous_block` back from `fork_tip` until a hash already
    /// present in `block_height_by_block_hash` is found, deletes every
    /// locally persisted row with `height` past that ancestor across all
    /// nine tables, then re-dispatches import jobs for every fork block
    /// that was walked past (the original `fork_tip` is re-imported by the
    /// caller, which already has it in hand). Bounded by `MAX_FORK_DEPTH`
    /// (SPEC_FULL.md §4.4). Holds `is_paused = true` for the whole walk and
    /// delete so the polling loop cannot interleave a new-tip import with
    /// the rollback (SPEC_FULL.md §4.6 step 1/3, §5's ordering guarantee).
    async fn resolve_fork(&self, fork_tip: &crate::node::Block) -> Result<(), OrchestratorError> {
        self.state.pause();
        let result = self.resolve_fork_inner(fork_tip).await;
        self.state.resume();
        result
    }

    async fn resolve_fork_inner(&self, fork_tip: &crate::node::Block) -> Result<(), OrchestratorError> {
        let mut cursor = fork_tip.previous_block.clone();
        let mut depth = 0;
        let mut skipped = Vec::new();

        let ancestor_height = loop {
            let Some(hash) = cursor else {
                break 0;
            };
            if let Some(height) = self.local_height_for_hash(&hash).await? {
                break height;
            }
            depth += 1;
            if depth > MAX_FORK_DEPTH {
                return Err(OrchestratorError::ForkTooDeep);
            }
            let block = self.node.fetch_block_by_hash(&hash).await?;
            let height = crate::sync::type_adapter::to_long(&block.height);
            skipped.push(Job { height, hash });
            cursor = block.previous_block;
        };

        self.delete_rows_above(ancestor_height).await?;
        warn!(ancestor_height, depth, "fork resolved, rolled back local state");

        // `skipped` was collected tip-to-ancestor (descending height);
        // dispatch oldest-first so import jobs land in ascending height
        // order (SPEC_FULL.md §5's ordering guarantee).
        for job in skipped.into_iter().rev() {
            self.worker_pool
                .submit(job)
                .await
                .map_err(|_| OrchestratorError::QueueClosed)?;
        }
        Ok(())
    }

    async fn local_height_for_hash(&self, hash: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT height FROM block_height_by_block_hash WHERE block_hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_rows_above(&self, ancestor_height: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // tx_tag/tx_offset key on tx_id, not height, and are pruned via a
        // subquery against block_by_tx_id — so they must run *before*
        // block_by_tx_id itself is deleted below, or the subquery sees
        // nothing and leaves them orphaned.
        sqlx::query(
            "DELETE FROM tx_tag WHERE tx_id IN (
                 SELECT tx_id FROM block_by_tx_id WHERE block_height > $1
             )",
        )
        .bind(ancestor_height)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM tx_offset WHERE tx_id IN (
                 SELECT tx_id FROM block_by_tx_id WHERE block_height > $1
             )",
        )
        .bind(ancestor_height)
        .execute(&mut *tx)
        .await?;

        for (table, height_column) in [
            ("block", "height"),
            ("block_gql_asc", "height"),
            ("block_gql_desc", "height"),
            ("block_height_by_block_hash", "height"),
            ("block_by_tx_id", "block_height"),
            ("poa", "block_height"),
            ("transaction", "block_height"),
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE {height_column} > $1"))
                .bind(ancestor_height)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_has_no_top_and_negative_heights() {
        let state = SyncState::default();
        assert_eq!(state.top_hash(), None);
        assert_eq!(state.current_height(), -1);
        assert!(!state.is_paused());
        assert!(!state.is_polling_started());
    }

    #[test]
    fn pause_and_resume_toggle_the_flag() {
        let state = SyncState::default();
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert!(!state.is_paused());
    }

    #[test]
    fn set_top_updates_hash_and_height_together() {
        let state = SyncState::default();
        state.set_top("hash42".to_string(), 42);
        assert_eq!(state.top_hash(), Some("hash42".to_string()));
        assert_eq!(state.top_height.load(Ordering::SeqCst), 42);
    }
}
