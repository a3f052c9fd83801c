//! API route modules.

pub mod logging;
pub mod overlay;
pub mod stream;

use axum::Router;
use tower_http::services::ServeDir;

use crate::api::server::AppState;

/// Create the main router: API routes, uploaded overlays and the static
/// dashboard as fallback.
pub fn create_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.upload_dir);
    let dashboard = ServeDir::new(&state.public_dir);

    Router::new()
        .merge(stream::router())
        .merge(overlay::router())
        .nest("/api/logging", logging::router())
        .nest_service("/uploads", uploads)
        .fallback_service(dashboard)
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_dashboard_and_uploads_are_served() {
        let public = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("index.html"), "<h1>relay</h1>").unwrap();
        std::fs::write(uploads.path().join("1-2.png"), b"png").unwrap();

        let (state, _launcher) = test_support::state(public.path(), uploads.path());
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<h1>relay</h1>");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/uploads/1-2.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
