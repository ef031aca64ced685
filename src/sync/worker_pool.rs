//! A bounded pool of `tokio::task`s that pull import jobs off a shared
//! channel (SPEC_FULL.md §5, REDESIGN FLAGS: the source's OS-subprocess
//! pool is replaced here with async tasks and an `async-channel` queue —
//! cooperative concurrency instead of process-per-worker).

use crate::node::NodeClient;
use crate::sync::projector;
use crate::sync::writer::{ExecutionProfile, Writer};
use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, warn};

pub type WorkerId = usize;

/// One unit of work: fetch, project, and persist the block at `height`.
#[derive(Debug, Clone)]
pub struct Job {
    pub height: i64,
    pub hash: String,
}

/// Progress events a worker broadcasts as it processes jobs, consumed by
/// the orchestrator for logging and by `metrics` for gauges.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Ready { worker_id: WorkerId },
    Log { worker_id: WorkerId, message: String },
    BlockImported { worker_id: WorkerId, height: i64 },
    TxInFlight { worker_id: WorkerId, count: u64 },
    JobFailed { worker_id: WorkerId, height: i64, error: String },
}

#[derive(Clone)]
pub struct WorkerPool {
    sender: Sender<Job>,
    events: broadcast::Sender<WorkerEvent>,
    tx_in_flight: Arc<DashMap<WorkerId, u64>>,
}

impl WorkerPool {
    /// Spawns `worker_count` tasks, each pulling `Job`s from a shared
    /// bounded queue until the channel closes.
    pub fn spawn(
        worker_count: usize,
        queue_capacity: usize,
        node: NodeClient,
        writer: Writer,
        profile: ExecutionProfile,
    ) -> Self {
        let (sender, receiver) = async_channel::bounded(queue_capacity);
        let (events, _) = broadcast::channel(1024);
        let tx_in_flight = Arc::new(DashMap::new());

        for worker_id in 0..worker_count {
            let receiver: Receiver<Job> = receiver.clone();
            let node = node.clone();
            let writer = writer.clone();
            let events_tx = events.clone();
            let tx_in_flight = Arc::clone(&tx_in_flight);
            tokio::spawn(async move {
                let _ = events_tx.send(WorkerEvent::Ready { worker_id });
                while let Ok(job) = receiver.recv().await {
                    let height = job.height;
                    if let Err(err) = process_job(
                        worker_id,
                        job,
                        &node,
                        &writer,
                        profile,
                        &events_tx,
                        &tx_in_flight,
                    )
                    .await
                    {
                        warn!(worker_id, height, %err, "import job failed");
                        let _ = events_tx.send(WorkerEvent::JobFailed {
                            worker_id,
                            height,
                            error: err.to_string(),
                        });
                    }
                }
            });
        }

        Self {
            sender,
            events,
            tx_in_flight,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub async fn submit(&self, job: Job) -> Result<(), async_channel::SendError<Job>> {
        self.sender.send(job).await
    }

    pub fn total_tx_in_flight(&self) -> u64 {
        self.tx_in_flight.iter().map(|entry| *entry.value()).sum()
    }

    pub fn close(&self) {
        self.sender.close();
    }
}

async fn process_job(
    worker_id: WorkerId,
    job: Job,
    node: &NodeClient,
    writer: &Writer,
    profile: ExecutionProfile,
    events: &broadcast::Sender<WorkerEvent>,
    tx_in_flight: &DashMap<WorkerId, u64>,
) -> anyhow::Result<()> {
    let block = node.fetch_block_by_hash(&job.hash).await?;

    tx_in_flight.insert(worker_id, block.txs.len() as u64);
    let _ = events.send(WorkerEvent::TxInFlight {
        worker_id,
        count: block.txs.len() as u64,
    });

    let fetches = join_all(block.txs.iter().map(|id| node.fetch_transaction(id))).await;
    let mut transactions = Vec::with_capacity(block.txs.len());
    for (id, fetched) in block.txs.iter().zip(fetches) {
        match fetched {
            Ok(Some(transaction)) => transactions.push(transaction),
            Ok(None) => warn!(worker_id, height = job.height, tx_id = %id, "tx body unavailable, skipping"),
            Err(err) => error!(worker_id, height = job.height, tx_id = %id, %err, "tx fetch failed, skipping"),
        }
    }

    let projected = projector::project(&block, &transactions);
    writer.write_block(&projected, profile).await?;

    tx_in_flight.insert(worker_id, 0);
    let _ = events.send(WorkerEvent::BlockImported {
        worker_id,
        height: job.height,
    });
    Ok(())
}
