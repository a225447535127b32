//! API route definitions
//!
//! [`create_router`] builds the control center surface under `/api/v1`;
//! [`worker_router`] builds the surface each worker process serves.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tracing::Level;

use crate::api::{handlers, middleware};
use crate::db::DatabaseConnection;
use crate::deployment::WorkerFactory;
use crate::jobs::JobManager;
use crate::metrics::MetricsCollector;
use crate::registry::WorkerRegistry;
use crate::routing::RoutingEngine;
use crate::worker::WorkerRuntime;

/// Shared control center state
#[derive(Clone)]
pub struct AppState {
    pub name: String,
    /// Checked by `/health` when present
    pub db: Option<DatabaseConnection>,
    pub registry: Arc<WorkerRegistry>,
    pub routing: Arc<RoutingEngine>,
    pub jobs: Arc<JobManager>,
    pub metrics: Arc<MetricsCollector>,
    pub factory: Arc<WorkerFactory>,
}

/// Build the control center router
pub fn create_router(app_state: AppState, cors_origins: &[String]) -> Router {
    let api = Router::new()
        // Registry
        .route("/workers", get(handlers::workers::list_workers))
        .route("/workers/healthy", get(handlers::workers::healthy_workers))
        .route("/workers/sweep", post(handlers::workers::sweep_workers))
        .route(
            "/workers/:id",
            get(handlers::workers::get_worker).delete(handlers::workers::remove_worker),
        )
        // Jobs
        .route(
            "/jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::create_job),
        )
        .route("/jobs/search", get(handlers::jobs::search_jobs))
        .route("/jobs/counts", get(handlers::jobs::job_counts))
        .route("/jobs/summary", get(handlers::jobs::jobs_summary))
        .route("/jobs/clean", post(handlers::jobs::clean_jobs))
        .route("/jobs/bulk/retry-failed", post(handlers::jobs::bulk_retry_failed))
        .route("/jobs/bulk/cancel", post(handlers::jobs::bulk_cancel))
        .route("/jobs/bulk/priority", post(handlers::jobs::bulk_priority))
        .route(
            "/jobs/repeatable",
            get(handlers::jobs::list_repeatable).post(handlers::jobs::create_repeatable),
        )
        .route("/jobs/repeatable/:key", delete(handlers::jobs::remove_repeatable))
        .route("/jobs/:id", get(handlers::jobs::get_job))
        .route("/jobs/:id/retry", post(handlers::jobs::retry_job))
        .route("/jobs/:id/cancel", post(handlers::jobs::cancel_job))
        .route("/jobs/:id/priority", post(handlers::jobs::change_priority))
        .route("/jobs/:id/promote", post(handlers::jobs::promote_job))
        .route("/jobs/:id/delay", post(handlers::jobs::delay_job))
        // Routing
        .route(
            "/routing/strategy",
            get(handlers::routing::get_strategy).put(handlers::routing::set_strategy),
        )
        .route("/routing/strategies", get(handlers::routing::list_strategies))
        .route("/routing/metrics", get(handlers::routing::routing_metrics))
        .route("/routing/metrics/reset", post(handlers::routing::reset_routing_metrics))
        .route(
            "/routing/affinity",
            get(handlers::routing::get_affinity).put(handlers::routing::set_affinity),
        )
        // Fleet metrics
        .route("/metrics", get(handlers::metrics::current_metrics))
        .route("/metrics/history", get(handlers::metrics::metrics_history))
        .route("/metrics/recommendations", get(handlers::metrics::recommendations))
        // Factory
        .route("/factory/templates", get(handlers::factory::list_templates))
        .route(
            "/factory/workers",
            get(handlers::factory::list_workers).post(handlers::factory::create_worker),
        )
        .route("/factory/workers/batch", post(handlers::factory::create_batch))
        .route("/factory/workers/:id", delete(handlers::factory::delete_worker))
        .route("/factory/workers/:id/clone", post(handlers::factory::clone_worker))
        .route("/factory/scale", post(handlers::factory::scale))
        .route("/factory/suggestions", get(handlers::factory::suggestions));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .with_state(app_state)
        .layer(middleware::logging_layer(Level::INFO))
        .layer(middleware::cors_layer(cors_origins))
}

/// Build the router a worker process serves
pub fn worker_router(runtime: Arc<WorkerRuntime>) -> Router {
    Router::new()
        .route("/execute", post(handlers::worker::execute))
        .route("/status", get(handlers::worker::worker_status))
        .route("/status/:execution_id", get(handlers::worker::execution_status))
        .route("/stop/:execution_id", post(handlers::worker::stop))
        .route("/pause/:execution_id", post(handlers::worker::pause))
        .route("/unpause/:execution_id", post(handlers::worker::unpause))
        .route("/resume", post(handlers::worker::resume))
        .route("/regenerate", post(handlers::worker::regenerate))
        .route("/health", get(handlers::worker::health))
        .with_state(runtime)
        .layer(middleware::logging_layer(Level::DEBUG))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::deployment::{FactoryConfig, InMemoryAdapter};
    use crate::execution::{ExecutionManager, InMemoryExecutionStore, NodeRegistry, WorkflowExecutionEngine};
    use crate::jobs::{InMemoryJobQueue, JobsConfig};
    use crate::metrics::MetricsConfig;
    use crate::registry::{InMemoryRecordStore, RegistryConfig, Worker, WorkerType};
    use crate::routing::RoutingConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_state() -> AppState {
        let registry = Arc::new(WorkerRegistry::new(
            Arc::new(InMemoryRecordStore::new()),
            RegistryConfig::default(),
        ));
        let queue = Arc::new(InMemoryJobQueue::new());
        AppState {
            name: "control-center".into(),
            db: None,
            routing: Arc::new(RoutingEngine::new(registry.clone(), RoutingConfig::default())),
            jobs: Arc::new(JobManager::new(queue.clone(), JobsConfig::default())),
            metrics: Arc::new(MetricsCollector::new(registry.clone(), queue, MetricsConfig::default())),
            factory: Arc::new(WorkerFactory::new(
                Arc::new(InMemoryAdapter::new()),
                FactoryConfig::default(),
            )),
            registry,
        }
    }

    fn worker_runtime() -> Arc<WorkerRuntime> {
        let engine = Arc::new(WorkflowExecutionEngine::new(
            Arc::new(InMemoryExecutionStore::new()),
            NodeRegistry::with_builtins(),
        ));
        let registry = Arc::new(WorkerRegistry::new(
            Arc::new(InMemoryRecordStore::new()),
            RegistryConfig::default(),
        ));
        Arc::new(WorkerRuntime::new(
            WorkerConfig {
                worker_id: "w-api".into(),
                ..Default::default()
            },
            ExecutionManager::new(engine, 2),
            registry,
            Arc::new(InMemoryJobQueue::new()),
        ))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn graph() -> Value {
        json!({
            "nodes": [
                {"id": "in", "type": "input", "config": {"field": "topic"}},
                {"id": "draft", "type": "template", "config": {"template": "Notes on {{in}}"}}
            ],
            "edges": [{"source": "in", "target": "draft"}]
        })
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let app = create_router(app_state(), &[]);
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "control-center");
    }

    #[tokio::test]
    async fn test_job_submission_and_lookup() {
        let app = create_router(app_state(), &[]);
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/jobs",
            Some(json!({"payload": {"executionId": "e-1", "workflow": graph()}, "priority": "high"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let job_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["payload"]["executionId"], "e-1");

        let (status, body) = call(&app, Method::GET, "/api/v1/jobs/search?term=e-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, Method::GET, "/api/v1/jobs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_workflow_job_without_graph_is_rejected() {
        let app = create_router(app_state(), &[]);
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/jobs",
            Some(json!({"payload": {"executionId": "e-2"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_bad_list_state_is_rejected() {
        let app = create_router(app_state(), &[]);
        let (status, _) = call(&app, Method::GET, "/api/v1/jobs?state=sleeping", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_strategy_switch() {
        let app = create_router(app_state(), &[]);
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/routing/strategy",
            Some(json!({"strategy": "round_robin"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&app, Method::GET, "/api/v1/routing/strategy", None).await;
        assert_eq!(body["data"]["strategy"], "round_robin");

        let (_, body) = call(&app, Method::GET, "/api/v1/routing/strategies", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_registered_workers_are_listed() {
        let state = app_state();
        let worker = Worker::new("w-1", WorkerType::Standard, "http://127.0.0.1:3001");
        state.registry.heartbeat(&worker).await.unwrap();
        let app = create_router(state, &[]);

        let (status, body) = call(&app, Method::GET, "/api/v1/workers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], "w-1");

        let (status, _) = call(&app, Method::DELETE, "/api/v1/workers/w-1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::DELETE, "/api/v1/workers/w-1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_factory_create_and_clone() {
        let app = create_router(app_state(), &[]);
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/factory/workers",
            Some(json!({"name": "writer-1", "workerType": "standard"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let port = body["data"]["config"]["port"].as_u64().unwrap();

        let (status, body) = call(&app, Method::POST, "/api/v1/factory/workers/writer-1/clone", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(body["data"]["config"]["port"].as_u64().unwrap(), port);

        let (status, _) = call(&app, Method::POST, "/api/v1/factory/workers/ghost/clone", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_worker_execute_waits_for_result() {
        let app = worker_router(worker_runtime());
        let (status, body) = call(
            &app,
            Method::POST,
            "/execute",
            Some(json!({"executionId": "x-1", "workflow": graph(), "inputs": {"topic": "rust"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");

        let (status, body) = call(&app, Method::GET, "/status/x-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_worker_execute_in_background() {
        let app = worker_router(worker_runtime());
        let (status, body) = call(
            &app,
            Method::POST,
            "/execute",
            Some(json!({
                "executionId": "x-2",
                "workflow": graph(),
                "inputs": {"topic": "rust"},
                "options": {"wait": false}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["status"], "queued");
    }

    #[tokio::test]
    async fn test_worker_rejects_bad_requests() {
        let app = worker_router(worker_runtime());
        let (status, _) = call(&app, Method::POST, "/execute", Some(json!({"workflow": graph()}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/regenerate",
            Some(json!({"executionId": "x-1", "workflow": graph()})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/status/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::POST, "/stop/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
