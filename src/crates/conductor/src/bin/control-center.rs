//! Control center binary
//!
//! Serves the REST API under `/api/v1` and runs the background loops:
//! dead-worker sweeps, recurring jobs, fleet metrics and job dispatch.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use conductor::api::{create_router, AppState};
use conductor::config::ControlCenterConfig;
use conductor::db::DatabaseConnection;
use conductor::deployment::{DeploymentAdapter, InMemoryAdapter, LocalProcessAdapter, WorkerFactory};
use conductor::dispatch::{Dispatcher, WorkerClient};
use conductor::execution::{ExecutionStore, SqliteExecutionStore};
use conductor::jobs::{JobManager, JobQueue, RecurringScheduler, SqliteJobQueue};
use conductor::metrics::MetricsCollector;
use conductor::registry::{SqliteRecordStore, WorkerRegistry};
use conductor::routing::RoutingEngine;

/// Orchestration control center
#[derive(Parser, Debug)]
#[command(name = "control-center")]
#[command(version)]
#[command(about = "Worker registry, job queue and routing for workflow workers", long_about = None)]
struct Args {
    /// Configuration file (defaults to CONFIG_PATH or config/control-center.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address host (overrides config)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Record factory workers without spawning processes
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tooling::logging::init_tracing(if args.verbose { "debug" } else { "info" });

    tracing::info!("Loading control center configuration...");
    let mut config = match &args.config {
        Some(path) => ControlCenterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControlCenterConfig::load()?,
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.dry_run {
        config.factory.dry_run = true;
    }
    tracing::info!("Routing strategy: {}", config.routing.strategy);
    tracing::info!("Database path: {}", config.database.path);

    let database_url = config.database_url();
    tracing::info!("Connecting to database: {}", database_url);
    let db = DatabaseConnection::with_max_connections(&database_url, config.database.max_connections).await?;

    tracing::info!("Running database migrations");
    db.run_migrations().await?;
    tracing::info!("Performing database health check");
    db.health_check().await?;

    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(SqliteRecordStore::new(db.clone())),
        config.registry.clone(),
    ));
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(db.clone()));
    let executions: Arc<dyn ExecutionStore> = Arc::new(SqliteExecutionStore::new(db.clone()));
    let routing = Arc::new(RoutingEngine::new(registry.clone(), config.routing.clone()));
    let jobs = Arc::new(
        JobManager::new(queue.clone(), config.jobs.clone())
            .with_execution_store(executions)
            .with_worker_control(registry.clone(), WorkerClient::new(config.dispatch.request_timeout())?),
    );

    let adapter: Arc<dyn DeploymentAdapter> = if config.factory.dry_run {
        tracing::info!("Factory in dry-run mode, workers are recorded only");
        Arc::new(InMemoryAdapter::new())
    } else {
        let local = LocalProcessAdapter::open(&config.factory.worker_list_file).await?;
        let started = local.start_all().await?;
        tracing::info!("Started {} listed workers", started);
        Arc::new(local)
    };
    let factory = Arc::new(WorkerFactory::new(adapter, config.factory.clone()).with_registry(registry.clone()));
    let metrics = Arc::new(MetricsCollector::new(registry.clone(), queue.clone(), config.metrics.clone()));

    let mut tasks = vec![
        registry.spawn_sweeper(),
        Arc::new(RecurringScheduler::new(queue.clone(), config.jobs.scheduler_interval())).spawn(),
        metrics.spawn(),
    ];
    if config.dispatch.enabled {
        tracing::info!(
            "Dispatching up to {} jobs every {}ms",
            config.dispatch.batch_size,
            config.dispatch.interval_ms
        );
        tasks.push(Arc::new(Dispatcher::new(queue.clone(), routing.clone(), config.dispatch.clone())?).spawn());
    } else {
        tracing::info!("Dispatch disabled, workers pull jobs from the queue");
    }

    tracing::info!("Building API router");
    let app = create_router(
        AppState {
            name: config.server.name.clone(),
            db: Some(db.clone()),
            registry,
            routing,
            jobs,
            metrics,
            factory,
        },
        &config.server.cors_origins,
    );

    let addr: SocketAddr = config.bind_addr().parse()?;
    tracing::info!("Starting control center on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.abort();
    }
    db.close().await;
    tracing::info!("Control center shut down gracefully");
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
