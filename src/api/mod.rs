//! API layer -- axum routes, handlers, and middleware.

pub mod error;
mod routes;
pub mod state;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use self::error::{ApiError, ApiResult};
pub use self::routes::{ListQuery, OverlayQuery, WebcamFrameRequest};
pub use self::state::AppState;

/// Room for multipart framing on top of the largest accepted file, so
/// oversize files are reported by upload validation rather than the body
/// limit.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.server.max_upload_bytes + MULTIPART_OVERHEAD).unwrap_or(usize::MAX);
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(cors_layer(&state.server.cors_origin));

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .nest("/api", routes::api_routes())
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if origin == "*" {
        return base.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => base.allow_origin(value).allow_credentials(true),
        Err(_) => {
            tracing::warn!(%origin, "invalid CORS origin, cross-origin requests disabled");
            base
        }
    }
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let app = router(AppState::new(&AppConfig::default()));
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let app = router(AppState::new(&AppConfig::default()));
        let resp = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/stats")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = router(AppState::new(&AppConfig::default()));
        let resp = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
