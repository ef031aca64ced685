//! The sync engine: normalizes upstream wire data, projects it into row
//! sets, writes them idempotently, and keeps the local chain caught up
//! with the remote node (SPEC_FULL.md §4).

pub mod doctor;
pub mod orchestrator;
pub mod projector;
pub mod type_adapter;
pub mod worker_pool;
pub mod writer;

pub use orchestrator::{Orchestrator, OrchestratorError, SyncState};
pub use worker_pool::{Job, WorkerEvent, WorkerPool};
pub use writer::{ExecutionProfile, Writer, WriterError};
