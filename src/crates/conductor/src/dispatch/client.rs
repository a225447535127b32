//! HTTP client for the worker surface

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::api::models::worker::ExecuteRequest;
use crate::api::{ApiErrorResponse, SuccessResponse};
use crate::ConductorError;

/// Why a call to a worker did not succeed
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker answered 503
    #[error("Worker {0} is at capacity")]
    Capacity(String),

    /// The worker refused the request
    #[error("Worker {worker} rejected the request ({status}): {message}")]
    Rejected {
        worker: String,
        status: u16,
        message: String,
    },

    /// Connection, timeout or protocol failure
    #[error("Worker {worker} unreachable: {message}")]
    Transport { worker: String, message: String },

    /// A 2xx answer with an unexpected body
    #[error("Invalid response from worker {worker}: {message}")]
    InvalidResponse { worker: String, message: String },
}

impl DispatchError {
    /// Whether sending the same job later, possibly elsewhere, may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Capacity(_) | DispatchError::Transport { .. })
    }
}

impl From<DispatchError> for ConductorError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Capacity(worker) => {
                ConductorError::NoWorkers(format!("worker {} is at capacity", worker))
            }
            DispatchError::Rejected { status, message, .. } if status == 404 => {
                ConductorError::ExecutionNotFound(message)
            }
            DispatchError::Rejected { status, message, .. } if (400..500).contains(&status) => {
                ConductorError::Validation(message)
            }
            other => ConductorError::General(other.to_string()),
        }
    }
}

/// JSON client for `/execute`, `/status`, `/stop` and `/health` on workers.
///
/// Workers are addressed by their registered endpoint, for example
/// `http://127.0.0.1:3001`.
#[derive(Clone)]
pub struct WorkerClient {
    client: Client,
}

impl WorkerClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport {
                worker: "-".to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// `POST /execute`; the data is either the accepted ack or the full result
    pub async fn execute(&self, endpoint: &str, body: &ExecuteRequest) -> Result<serde_json::Value, DispatchError> {
        let url = format!("{}/execute", endpoint.trim_end_matches('/'));
        let response = self.client.post(&url).json(body).send().await;
        read(endpoint, response).await
    }

    /// `GET /status/:execution_id`
    pub async fn status(&self, endpoint: &str, execution_id: &str) -> Result<serde_json::Value, DispatchError> {
        let url = format!("{}/status/{}", endpoint.trim_end_matches('/'), execution_id);
        let response = self.client.get(&url).send().await;
        read(endpoint, response).await
    }

    /// `POST /stop/:execution_id`
    pub async fn stop(&self, endpoint: &str, execution_id: &str) -> Result<serde_json::Value, DispatchError> {
        let url = format!("{}/stop/{}", endpoint.trim_end_matches('/'), execution_id);
        let response = self.client.post(&url).send().await;
        read(endpoint, response).await
    }

    /// `GET /health`
    pub async fn health(&self, endpoint: &str) -> Result<serde_json::Value, DispatchError> {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        let response = self.client.get(&url).send().await;
        read(endpoint, response).await
    }
}

async fn read<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Result<Response>,
) -> Result<T, DispatchError> {
    let response = response.map_err(|e| DispatchError::Transport {
        worker: endpoint.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(DispatchError::Capacity(endpoint.to_string()));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        return Err(DispatchError::Rejected {
            worker: endpoint.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let body: SuccessResponse<T> = response
        .json()
        .await
        .map_err(|e| DispatchError::InvalidResponse {
            worker: endpoint.to_string(),
            message: e.to_string(),
        })?;
    Ok(body.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::api::response;
    use axum::{extract::Path, response::IntoResponse, routing::{get, post}, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client() -> WorkerClient {
        WorkerClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_execute_returns_data() {
        let app = Router::new().route(
            "/execute",
            post(|| async { response::accepted(serde_json::json!({"executionId": "e1", "status": "queued"})) }),
        );
        let endpoint = serve(app).await;

        let data = client()
            .execute(&endpoint, &ExecuteRequest::default())
            .await
            .unwrap();
        assert_eq!(data["status"], "queued");
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let app = Router::new()
            .route(
                "/execute",
                post(|| async { ApiError::Unavailable("5/5 executions".into()).into_response() }),
            )
            .route(
                "/status/:id",
                get(|Path(id): Path<String>| async move {
                    ApiError::NotFound(format!("Execution not found: {}", id)).into_response()
                }),
            );
        let endpoint = serve(app).await;
        let client = client();

        let capacity = client.execute(&endpoint, &ExecuteRequest::default()).await.unwrap_err();
        assert!(matches!(capacity, DispatchError::Capacity(_)));
        assert!(capacity.is_retryable());

        let missing = client.status(&endpoint, "e404").await.unwrap_err();
        match &missing {
            DispatchError::Rejected { status, message, .. } => {
                assert_eq!(*status, 404);
                assert!(message.contains("e404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!missing.is_retryable());
        assert!(ConductorError::from(missing).is_not_found());
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client().health(&endpoint).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport { .. }));
        assert!(err.is_retryable());
    }
}
