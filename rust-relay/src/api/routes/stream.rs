//! Stream control routes.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::supervisor::{CommandAck, Layout, SupervisorStatus};

/// Body of `POST /api/stream`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StreamRequest {
    Start {
        url: String,
        #[serde(default)]
        layout: Option<Layout>,
    },
    Stop,
    ChangeSource {
        url: String,
    },
    UpdateOverlay {
        #[serde(default)]
        layout: Option<Layout>,
    },
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stream", post(stream_command))
        .route("/api/status", get(stream_status))
}

/// Dispatch one operator command to the supervisor.
pub async fn stream_command(
    State(state): State<AppState>,
    payload: Result<Json<StreamRequest>, JsonRejection>,
) -> ApiResult<Json<CommandAck>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let supervisor = &state.supervisor;

    let ack = match request {
        StreamRequest::Start { url, layout } => supervisor.start(url, layout).await?,
        StreamRequest::Stop => supervisor.stop().await?,
        StreamRequest::ChangeSource { url } => supervisor.change_source(url).await?,
        StreamRequest::UpdateOverlay { layout } => supervisor.update_overlay(layout, None).await?,
    };

    Ok(Json(ack))
}

pub async fn stream_status(State(state): State<AppState>) -> ApiResult<Json<SupervisorStatus>> {
    Ok(Json(state.supervisor.status().await?))
}
