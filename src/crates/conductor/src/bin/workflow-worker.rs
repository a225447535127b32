//! Workflow worker binary
//!
//! Configured from `WORKER_*` environment variables. Registers itself with
//! the shared registry, serves the execution surface and, in queue mode,
//! pulls jobs from the shared queue.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tooling::config::ConfigBuilder;

use conductor::api::worker_router;
use conductor::config::WorkerConfig;
use conductor::db::DatabaseConnection;
use conductor::execution::{ExecutionManager, NodeRegistry, SqliteExecutionStore, WorkflowExecutionEngine};
use conductor::jobs::SqliteJobQueue;
use conductor::registry::{SqliteRecordStore, WorkerRegistry};
use conductor::worker::WorkerRuntime;

/// Workflow worker process
#[derive(Parser, Debug)]
#[command(name = "workflow-worker")]
#[command(version)]
#[command(about = "Runs checkpointed workflow executions for the control center", long_about = None)]
struct Args {
    /// Worker id (overrides WORKER_ID)
    #[arg(long)]
    id: Option<String>,

    /// Listen port (overrides WORKER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not pull jobs from the queue
    #[arg(long)]
    no_queue: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tooling::logging::init_tracing(if args.verbose { "debug" } else { "info" });

    let mut config = WorkerConfig::from_environment()?;
    if let Some(id) = args.id {
        config.worker_id = id;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_queue {
        config.queue_enabled = false;
    }
    config.validate()?;
    tracing::info!(
        "Worker {} ({}) with {} slots",
        config.worker_id,
        config.worker_type,
        config.max_concurrent
    );

    tracing::info!("Connecting to database: {}", config.database_url);
    let db = DatabaseConnection::new(&config.database_url).await?;
    db.run_migrations().await?;
    db.health_check().await?;

    let engine = Arc::new(WorkflowExecutionEngine::new(
        Arc::new(SqliteExecutionStore::new(db.clone())),
        NodeRegistry::with_builtins(),
    ));
    let manager = ExecutionManager::new(engine, config.max_concurrent as usize);
    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(SqliteRecordStore::new(db.clone())),
        config.registry_config(),
    ));
    let queue = Arc::new(SqliteJobQueue::new(db.clone()));

    let addr: SocketAddr = config.bind_addr().parse()?;
    let runtime = Arc::new(WorkerRuntime::new(config, manager, registry, queue));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    runtime.start().await?;
    tracing::info!("Worker listening on {}", addr);

    let served = axum::serve(listener, worker_router(runtime.clone()).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = runtime.shutdown().await {
        tracing::warn!("Worker shutdown incomplete: {}", e);
    }
    db.close().await;
    served?;
    tracing::info!("Worker shut down gracefully");
    Ok(())
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
