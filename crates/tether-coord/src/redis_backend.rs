//! Redis coordination backend.

use crate::backend::{CoordinationBackend, PayloadStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Redis-backed coordination store.
///
/// Commands share one managed connection, opened on first use and
/// re-established in the background after the server drops it. A failed
/// first connect is not cached; the next command tries again. Every
/// subscription gets its own pub/sub connection, since a connection in
/// subscribe mode cannot issue commands.
pub struct RedisBackend {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisBackend {
    /// Validates `url` without connecting.
    pub fn new(url: &str) -> TetherResult<Self> {
        let client = redis::Client::open(url).map_err(to_error)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> TetherResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(CONNECT_RETRIES)
                    .set_connection_timeout(CONNECT_TIMEOUT);
                let conn = self
                    .client
                    .get_connection_manager_with_config(config)
                    .await
                    .map_err(to_error)?;
                info!("Connected to coordination store");
                Ok::<_, TetherError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

/// Reconnect attempts before a command fails.
const CONNECT_RETRIES: usize = 2;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

fn to_error(err: redis::RedisError) -> TetherError {
    TetherError::Coordination(err.to_string())
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CoordinationBackend for RedisBackend {
    async fn get(&self, key: &str) -> TetherResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(to_error)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key, value, ttl_secs(ttl))
            .await
            .map_err(to_error)?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<bool> {
        let mut conn = self.connection().await?;
        // SET key value NX EX ttl answers OK when written and nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(to_error)?;
        Ok(reply.is_some())
    }

    async fn set_xx_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(to_error)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> TetherResult<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(key).await.map_err(to_error)?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> TetherResult<()> {
        let mut conn = self.connection().await?;
        let receivers: i64 = conn.publish(channel, payload).await.map_err(to_error)?;
        debug!(channel, receivers, "Published control event");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> TetherResult<PayloadStream> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(to_error)?;
        pubsub.subscribe(channel).await.map_err(to_error)?;
        let channel = channel.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = msg.get_payload::<String>();
            let channel = channel.clone();
            async move {
                match payload {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Dropping undecodable payload");
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}
