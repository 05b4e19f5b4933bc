//! Health-check HTTP surface
//!
//! Deliberately tiny: deployment platforms probe `/` or `/health` to keep
//! the process alive. Everything interesting happens over the chat
//! transport.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

async fn health() -> &'static str {
    "Paisa expense tracker is running"
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_health_routes_respond() {
        for path in ["/", "/health"] {
            let response = router()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "path {}", path);
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
