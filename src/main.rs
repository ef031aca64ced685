use anyhow::Result;
use chain_gateway::config::Settings;
use chain_gateway::db::schema;
use chain_gateway::metrics::{self, Metrics};
use chain_gateway::node::NodeClient;
use chain_gateway::sync::{ExecutionProfile, Orchestrator, Writer, WorkerPool};
use clap::Parser;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Truncate every table before starting sync.
    #[arg(long)]
    reset: bool,

    /// Run the initial backfill and exit without entering the poll loop.
    #[arg(long)]
    backfill_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new().unwrap_or_else(|e| {
        error!("failed to load configuration: {e:?}");
        std::process::exit(1);
    });
    info!(?settings, "loaded configuration");

    let prometheus_handle = metrics::setup_metrics_recorder();
    let app_metrics = Metrics::new(prometheus_handle);

    let connection_string = format!(
        "postgres://{}:{}@{}/{}",
        settings.database.username,
        settings.database.password,
        settings.primary_contact_point(),
        settings.database.database_name
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(Duration::from_secs(settings.database.db_timeout_secs))
        .connect(&connection_string)
        .await?;
    info!("connected to database");

    schema::initialize_database(&pool).await?;
    info!("schema ready");

    if args.reset {
        reset_database(&pool).await?;
        info!("database reset");
    }

    let node = NodeClient::new(settings.node.url.clone());
    match wait_for_node(&node).await {
        Some(info) => info!(height = info.height, "connected to node"),
        None => {
            error!("node did not become reachable after retrying");
            std::process::exit(1);
        }
    }

    let writer = Writer::new(pool.clone());
    let worker_pool = WorkerPool::spawn(
        settings.sync.parallel_workers,
        settings.sync.parallel_workers * 4,
        node.clone(),
        writer,
        ExecutionProfile::Full,
    );

    spawn_progress_relay(worker_pool.subscribe(), app_metrics.clone());

    let orchestrator = Orchestrator::new(&settings, node, pool.clone(), worker_pool, app_metrics);

    orchestrator.start_sync().await?;
    info!("backfill complete");

    if args.backfill_only {
        return Ok(());
    }

    tokio::select! {
        result = orchestrator.start_polling() => {
            if let Err(err) = result {
                error!(%err, "poll loop exited with an error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}

/// Drains `WorkerEvent`s onto the metrics/progress layer (SPEC_FULL.md
/// §4.5): `TxInFlight` updates the gauge, `BlockImported` bumps the
/// counter, `Log`/`JobFailed` are surfaced through tracing.
fn spawn_progress_relay(
    mut events: tokio::sync::broadcast::Receiver<chain_gateway::sync::WorkerEvent>,
    metrics: Metrics,
) {
    use chain_gateway::sync::WorkerEvent;
    use tracing::warn;

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::Ready { worker_id }) => {
                    info!(worker_id, "worker ready");
                }
                Ok(WorkerEvent::Log { worker_id, message }) => {
                    info!(worker_id, message);
                }
                Ok(WorkerEvent::BlockImported { worker_id, height }) => {
                    metrics.record_block_imported();
                    info!(worker_id, height, "block imported");
                }
                Ok(WorkerEvent::TxInFlight { worker_id, count }) => {
                    metrics.record_tx_in_flight(count);
                    let _ = worker_id;
                }
                Ok(WorkerEvent::JobFailed { worker_id, height, error }) => {
                    warn!(worker_id, height, %error, "import job failed");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress relay lagged behind worker events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Retries `get_node_info` with exponential backoff and jitter, tolerating
/// the node still being mid-boot when this process starts (SPEC_FULL.md's
/// ambient resiliency stack).
async fn wait_for_node(node: &NodeClient) -> Option<chain_gateway::node::NodeInfo> {
    use tokio_retry::strategy::{jitter, ExponentialBackoff};
    use tokio_retry::Retry;

    let strategy = ExponentialBackoff::from_millis(500)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(6);

    Retry::spawn(strategy, || async {
        match node.get_node_info().await {
            Ok(Some(info)) => Ok(info),
            Ok(None) => Err(()),
            Err(err) => {
                error!(%err, "node info request errored while waiting for node");
                Err(())
            }
        }
    })
    .await
    .ok()
}

async fn reset_database(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        "TRUNCATE TABLE block, block_gql_asc, block_gql_desc, block_height_by_block_hash,
                      block_by_tx_id, poa, transaction, tx_tag, tx_offset",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
