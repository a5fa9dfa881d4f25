mod config;

use clap::{Parser, Subcommand};
use config::TetherConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_agent::ScriptedEngine;
use tether_coord::{CoordinationStore, MessageStash};
use tether_core::SessionId;
use tether_gateway::{AuthConfig, GatewayServer};
use tether_lifecycle::{is_running_state, StopOutcome, StreamControl, StreamOrchestrator};
use tether_session::FileConversationStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether", about = "Tether: resumable generation streams")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tether.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show whether a session is generating
    Status { session: String },
    /// Cancel a session's generation, wherever it runs
    Stop {
        session: String,
        /// Wait until the generation has stopped
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = TetherConfig::load(&cli.config)
        .await?
        .with_env(std::env::var("REDIS_URL").ok());

    let store = CoordinationStore::from_config(&config.coordination);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            info!("Starting Tether gateway on {host}:{port}");

            let conversations = Arc::new(
                FileConversationStore::new(config.data_dir.join("conversations")).await?,
            );
            let engine = ScriptedEngine::echo()
                .with_chunk_delay(Duration::from_millis(config.engine.chunk_delay_ms))
                .with_memory(conversations.clone());

            let orchestrator = StreamOrchestrator::new(
                store.clone(),
                Arc::new(engine),
                conversations,
                config.lifecycle,
                config.driver,
            );

            let auth_config = AuthConfig::new(config.security.api_keys.clone());
            if auth_config.is_enabled() {
                info!(keys = config.security.api_keys.len(), "API key auth enabled");
            }

            let app =
                GatewayServer::build_with_auth(orchestrator, MessageStash::new(store), auth_config);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Tether gateway listening on {addr}");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                    info!("Shutting down");
                })
                .await?;
        }
        Commands::Status { session } => {
            let control = StreamControl::new(store, config.lifecycle);
            let session_id = SessionId::new(session);
            let state = control.stream_state(&session_id).await;
            let report = status_report(&session_id, state);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stop { session, wait } => {
            if config.coordination.url.is_none() {
                warn!("No coordination store configured; stop only reaches this process");
            }
            let control = StreamControl::new(store, config.lifecycle);
            let session_id = SessionId::new(session);
            control.stop_stream(&session_id).await;

            if wait {
                match control.wait_for_stream_to_stop(&session_id).await {
                    StopOutcome::Stopped => println!("stopped"),
                    StopOutcome::TimedOut => {
                        println!("timed out");
                        std::process::exit(1);
                    }
                }
            } else {
                println!("cancelling");
            }
        }
    }

    Ok(())
}

/// JSON report printed by `tether status`.
fn status_report(session_id: &SessionId, state: Option<String>) -> serde_json::Value {
    serde_json::json!({
        "session_id": session_id,
        "running": is_running_state(state.as_deref()),
        "state": state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_uses_the_claim_marker() {
        let id = SessionId::from("s1");
        let report = status_report(&id, Some("running".into()));
        assert_eq!(report["running"], true);
        assert_eq!(report["state"], "running");

        let report = status_report(&id, Some("stale".into()));
        assert_eq!(report["running"], false);
        assert_eq!(report["state"], "stale");

        let report = status_report(&id, None);
        assert_eq!(report["running"], false);
        assert!(report["state"].is_null());
        assert_eq!(report["session_id"], "s1");
    }
}
