//! Overlay upload and preview routes.

use std::path::Path;

use axum::{
    Json, Router,
    extract::{Multipart, Request, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::error::Error;

/// Multipart field carrying the image.
pub const OVERLAY_FIELD: &str = "overlayImage";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    /// Public URL of the stored file.
    pub path: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/upload", post(upload_overlay))
        .route("/overlay_preview", get(overlay_preview))
}

/// `{millis}-{random}{.ext}`, unique enough to defeat browser caching.
fn stored_file_name(original: Option<&str>) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>() % 1_000_000_000,
        ext
    )
}

/// Store an uploaded overlay and make it the asset for the next spawn.
pub async fn upload_overlay(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(OVERLAY_FIELD) {
            continue;
        }

        let file_name = stored_file_name(field.file_name());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if data.is_empty() {
            return Err(ApiError::bad_request("No file uploaded."));
        }

        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(Error::from)?;
        let path = state.upload_dir.join(&file_name);
        tokio::fs::write(&path, &data).await.map_err(Error::from)?;

        state.supervisor.set_overlay_asset(path.clone()).await?;
        info!(path = %path.display(), bytes = data.len(), "New overlay stored");

        return Ok(Json(UploadResponse {
            message: "Overlay updated!".to_string(),
            path: format!("/uploads/{}", file_name),
        }));
    }

    Err(ApiError::bad_request("No file uploaded."))
}

/// Serve the overlay the next spawn will use.
pub async fn overlay_preview(State(state): State<AppState>, request: Request) -> ApiResult<Response> {
    let status = state.supervisor.status().await?;
    let path = status.current_config.overlay_path;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::not_found("Overlay image not found."));
    }

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::test_support::{body_json, state};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};

    const BOUNDARY: &str = "relay-test-boundary";

    fn multipart_request(field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_stored_file_name_keeps_extension() {
        let name = stored_file_name(Some("My Logo.PNG"));
        assert!(name.ends_with(".png"));
        assert!(name.split('-').next().unwrap().parse::<i64>().is_ok());

        assert!(!stored_file_name(None).contains('.'));
    }

    #[tokio::test]
    async fn test_upload_then_preview() {
        let public = tempfile::tempdir().unwrap();
        let uploads = public.path().join("uploads");
        let (state, _launcher) = state(public.path(), &uploads);
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(multipart_request(OVERLAY_FIELD, "frame.png", b"\x89PNG-data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Overlay updated!");
        let public_path = json["path"].as_str().unwrap();
        let stored = public_path.strip_prefix("/uploads/").unwrap();
        assert!(stored.ends_with(".png"));
        assert_eq!(std::fs::read(uploads.join(stored)).unwrap(), b"\x89PNG-data");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/overlay_preview")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"\x89PNG-data");
    }

    #[tokio::test]
    async fn test_upload_without_image_field() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _launcher) = state(dir.path(), dir.path());

        let response = router()
            .with_state(state)
            .oneshot(multipart_request("somethingElse", "a.png", b"data"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preview_missing_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _launcher) = state(dir.path(), dir.path());
        state
            .supervisor
            .set_overlay_asset(dir.path().join("absent.png"))
            .await
            .unwrap();

        let response = router()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .uri("/overlay_preview")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
