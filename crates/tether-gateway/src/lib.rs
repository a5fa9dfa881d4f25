//! HTTP surface: start, resume, stop and inspect generations over SSE.

pub mod handlers;
pub mod initial;
pub mod middleware;
pub mod response;
pub mod server;

pub use middleware::AuthConfig;
pub use server::{AppState, GatewayServer};
