//! Typed HTTP client for the remote chain node. This is the external
//! collaborator SPEC_FULL.md §1 calls out as out of scope beyond a typed
//! interface: `get_node_info`, `get_hash_list`, `fetch_block_by_hash`.

mod types;

pub use types::{Block, NodeInfo, Tag, Transaction};

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct NodeClient {
    http: Client,
    base_url: String,
}

impl NodeClient {
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self { http, base_url }
    }

    /// `getNodeInfo() -> { current, height } | nil`. A `None` return means
    /// the node is unreachable or mid-restart; callers sleep and retry.
    pub async fn get_node_info(&self) -> Result<Option<NodeInfo>> {
        let url = format!("{}/info", self.base_url);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "node info request failed, treating as unavailable");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "node info returned non-success status");
            return Ok(None);
        }

        let info: NodeInfo = response
            .json()
            .await
            .context("failed to decode node info response")?;
        Ok(Some(info))
    }

    /// `getHashList() -> ordered list of block hashes, index = height`.
    pub async fn get_hash_list(&self) -> Result<Vec<String>> {
        let url = format!("{}/hash_list", self.base_url);
        let hash_list = self
            .http
            .get(&url)
            .send()
            .await
            .context("hash list request failed")?
            .error_for_status()
            .context("hash list request returned an error status")?
            .json()
            .await
            .context("failed to decode hash list response")?;
        Ok(hash_list)
    }

    /// `fetchBlockByHash(hash) -> Block`.
    pub async fn fetch_block_by_hash(&self, hash: &str) -> Result<Block> {
        let url = format!("{}/block/hash/{hash}", self.base_url);
        let block = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("block fetch failed for hash {hash}"))?
            .error_for_status()
            .with_context(|| format!("block fetch returned an error status for hash {hash}"))?
            .json()
            .await
            .with_context(|| format!("failed to decode block response for hash {hash}"))?;
        Ok(block)
    }

    /// `fetchTransaction(id) -> Transaction | None`. A block only carries
    /// tx ids; bodies are fetched one at a time. `None` means the node
    /// doesn't have this tx (pruned, or never seen it) — callers log and
    /// skip rather than failing the whole block (SPEC_FULL.md §7).
    pub async fn fetch_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let url = format!("{}/tx/{id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("transaction fetch failed for id {id}"))?;

        if !response.status().is_success() {
            debug!(id, status = %response.status(), "transaction not available");
            return Ok(None);
        }

        let transaction = response
            .json()
            .await
            .with_context(|| format!("failed to decode transaction response for id {id}"))?;
        Ok(Some(transaction))
    }
}
