//! CORS for the control center surface

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// CORS layer for `origins`; permissive when the list is empty.
///
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn origin_header(origins: &[String], origin: &str) -> Option<String> {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(cors_layer(origins));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header("origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_listed_origin_allowed() {
        let origins = vec!["https://console.example.com".to_string()];
        assert_eq!(
            origin_header(&origins, "https://console.example.com").await.as_deref(),
            Some("https://console.example.com")
        );
        assert!(origin_header(&origins, "https://elsewhere.example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_list_is_permissive() {
        assert!(origin_header(&[], "https://anything.example.com").await.is_some());
    }
}
