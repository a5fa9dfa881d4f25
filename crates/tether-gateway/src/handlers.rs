//! HTTP handlers.

use crate::response::{stream_response, ApiError};
use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tether_core::{Message, SessionId, TetherError};
use tether_lifecycle::StopOutcome;
use tracing::{debug, info};

/// Body of a start request.
#[derive(Deserialize)]
pub struct StartRequest {
    /// The user message that opens the generation.
    pub message: Message,
}

/// `POST /api/sessions/{id}/messages`: start a generation and stream it.
pub async fn start_generation(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) =
        body.map_err(|e| TetherError::InvalidMessage(e.body_text()))?;
    let session_id = SessionId::new(id);

    let started = state
        .orchestrator
        .start(&session_id, request.message)
        .await?;
    info!(session_id = %session_id, "Streaming new generation");
    Ok(stream_response(started.stream.into_reader()))
}

/// `GET /api/sessions/{id}/stream`: join the open stream, or 204.
pub async fn resume_generation(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let session_id = SessionId::new(id);
    match state.orchestrator.resume(&session_id)? {
        Some(reader) => {
            debug!(session_id = %session_id, position = reader.position(), "Resuming stream");
            Ok(stream_response(reader))
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Query string of a stop request.
#[derive(Deserialize, Default)]
pub struct StopQuery {
    /// Block until the claim is gone (or the poll bound is hit).
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/sessions/{id}/stop[?wait=true]`.
pub async fn stop_generation(
    Path(id): Path<String>,
    Query(query): Query<StopQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let session_id = SessionId::new(id);
    state.orchestrator.cancel(&session_id).await;

    if !query.wait {
        return (StatusCode::ACCEPTED, Json(json!({"status": "cancelling"}))).into_response();
    }
    let status = match state.orchestrator.wait_for_stream_to_stop(&session_id).await {
        StopOutcome::Stopped => "stopped",
        StopOutcome::TimedOut => "timed_out",
    };
    (StatusCode::OK, Json(json!({"status": status}))).into_response()
}

/// `GET /api/sessions/{id}/status`.
pub async fn generation_status(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let session_id = SessionId::new(id);
    let running = state.orchestrator.is_stream_running(&session_id).await;
    Json(json!({
        "session_id": session_id,
        "running": running,
        "state": state.orchestrator.local_state(&session_id),
    }))
}

/// `GET /health`.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "service": "tether"}))
}
