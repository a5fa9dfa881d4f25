//! Hand-off of a first message between page loads.
//!
//! A client posts the message it wants to send, navigates, and the next page
//! fetches it exactly once.

use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tether_core::message::validate_parts;
use tether_core::{MessagePart, PendingMessage};
use tracing::{error, info, warn};

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

/// `POST /api/initial-message` with `{"parts": [...], "templateId": "..."}`.
pub async fn stash_initial_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(parts) = body.get("parts").filter(|p| p.is_array()) else {
        return bad_request("parts must be an array");
    };
    let Some(template_id) = body.get("templateId").and_then(Value::as_str) else {
        return bad_request("templateId is required");
    };
    let parts: Vec<MessagePart> = match serde_json::from_value(parts.clone()) {
        Ok(parts) => parts,
        Err(e) => return bad_request(&format!("invalid parts: {e}")),
    };
    if let Err(e) = validate_parts(&parts) {
        return bad_request(&e.to_string());
    }

    match state.stash.put(&PendingMessage::new(parts, template_id)).await {
        Ok(message_id) => {
            info!(message_id = %message_id, template_id, "Stashed initial message");
            Json(json!({"messageId": message_id})).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to stash initial message");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to store message"})),
            )
                .into_response()
        }
    }
}

/// Query of an initial-message fetch.
#[derive(Deserialize)]
pub struct InitialMessageQuery {
    /// Id returned when the message was stashed.
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
}

/// `GET /api/initial-message?messageId=...`: returns the message once.
pub async fn take_initial_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InitialMessageQuery>,
) -> Response {
    let Some(message_id) = query.message_id.filter(|id| !id.is_empty()) else {
        return bad_request("messageId is required");
    };
    match state.stash.take(&message_id).await {
        Ok(Some(message)) => Json(message).into_response(),
        Ok(None) => {
            warn!(message_id = %message_id, "Initial message not found or expired");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "message not found or expired"})),
            )
                .into_response()
        }
        Err(e) => {
            error!(message_id = %message_id, error = %e, "Failed to read initial message");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to read message"})),
            )
                .into_response()
        }
    }
}
