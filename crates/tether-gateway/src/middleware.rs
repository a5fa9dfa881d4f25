//! API key authentication.

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Auth configuration for the gateway.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// API keys that are allowed to connect. Empty = no auth required.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    /// Accepts exactly `api_keys`.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Returns true if authentication is enabled (at least one key configured).
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    fn accepts(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k == key)
    }
}

/// Query-string fallback for clients that cannot set headers.
#[derive(serde::Deserialize, Default)]
pub struct AuthQuery {
    /// The API key.
    pub api_key: Option<String>,
}

/// Validates the API key from `Authorization: Bearer <key>` or `?api_key=`.
///
/// The header wins when both are present. With no keys configured every
/// request passes.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    query: Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }

    let key_from_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let key = key_from_header.or_else(|| query.api_key.clone());

    match key {
        Some(k) if auth.accepts(&k) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request: invalid API key");
            (StatusCode::UNAUTHORIZED, "Invalid API key").into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request: missing API key");
            (StatusCode::UNAUTHORIZED, "API key required").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    fn app(keys: Vec<&str>) -> Router {
        let auth = Arc::new(AuthConfig::new(keys.into_iter().map(String::from).collect()));
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(auth, auth_middleware))
    }

    async fn status(app: Router, uri: &str, bearer: Option<&str>) -> StatusCode {
        let mut request = axum::http::Request::builder().uri(uri);
        if let Some(key) = bearer {
            request = request.header("authorization", format!("Bearer {key}"));
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[test]
    fn test_auth_config_disabled() {
        assert!(!AuthConfig::new(vec![]).is_enabled());
        assert!(AuthConfig::new(vec!["key123".to_string()]).is_enabled());
    }

    #[tokio::test]
    async fn test_open_when_no_keys() {
        assert_eq!(status(app(vec![]), "/", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_key_sources() {
        assert_eq!(status(app(vec!["k1"]), "/", None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status(app(vec!["k1"]), "/", Some("k1")).await, StatusCode::OK);
        assert_eq!(status(app(vec!["k1"]), "/", Some("nope")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status(app(vec!["k1"]), "/?api_key=k1", None).await, StatusCode::OK);
        assert_eq!(
            status(app(vec!["k1"]), "/?api_key=k1", Some("bad")).await,
            StatusCode::UNAUTHORIZED
        );
    }
}
