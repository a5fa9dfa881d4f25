//! Streaming responses and error mapping.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use std::convert::Infallible;
use tether_core::TetherError;
use tether_stream::{ResumableReader, STREAM_HEADERS};
use tracing::error;

/// Streams a reader's chunks as the response body with the event-stream
/// headers.
pub fn stream_response(reader: ResumableReader) -> Response {
    let body = Body::from_stream(reader.into_stream().map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    for (name, value) in STREAM_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// Error returned by handlers; maps [`TetherError`] to a status code.
#[derive(Debug)]
pub struct ApiError(pub TetherError);

impl From<TetherError> for ApiError {
    fn from(e: TetherError) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TetherError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            TetherError::GenerationInProgress(_) => StatusCode::CONFLICT,
            TetherError::StreamResume(_) => StatusCode::NO_CONTENT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::SessionId;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TetherError::InvalidMessage("x".into()), StatusCode::BAD_REQUEST),
            (
                TetherError::GenerationInProgress(SessionId::from("s")),
                StatusCode::CONFLICT,
            ),
            (
                TetherError::StreamResume(SessionId::from("s")),
                StatusCode::NO_CONTENT,
            ),
            (
                TetherError::MissingStreamCapability("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }
}
