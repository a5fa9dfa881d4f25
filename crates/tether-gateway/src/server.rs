//! Router assembly.

use crate::handlers::{
    generation_status, health_handler, resume_generation, start_generation, stop_generation,
};
use crate::initial::{stash_initial_message, take_initial_message};
use crate::middleware::{auth_middleware, AuthConfig};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tether_coord::MessageStash;
use tether_lifecycle::StreamOrchestrator;

/// Shared application state.
pub struct AppState {
    /// Generation lifecycle for this process.
    pub orchestrator: StreamOrchestrator,
    /// First-message hand-off between page loads.
    pub stash: MessageStash,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth.
    pub fn build(orchestrator: StreamOrchestrator, stash: MessageStash) -> Router {
        Self::build_with_auth(orchestrator, stash, AuthConfig::default())
    }

    /// Build the gateway, requiring an API key when `auth` has any.
    pub fn build_with_auth(
        orchestrator: StreamOrchestrator,
        stash: MessageStash,
        auth: AuthConfig,
    ) -> Router {
        let state = Arc::new(AppState {
            orchestrator,
            stash,
        });

        let app = Router::new()
            .route("/api/sessions/{id}/messages", post(start_generation))
            .route("/api/sessions/{id}/stream", get(resume_generation))
            .route("/api/sessions/{id}/stop", post(stop_generation))
            .route("/api/sessions/{id}/status", get(generation_status))
            .route(
                "/api/initial-message",
                post(stash_initial_message).get(take_initial_message),
            )
            .route("/health", get(health_handler))
            .with_state(state);

        if auth.is_enabled() {
            app.layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware))
        } else {
            app
        }
    }
}
