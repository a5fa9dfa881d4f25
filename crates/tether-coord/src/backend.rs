//! The raw coordination backend seam.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;
use tether_core::TetherResult;

/// Stream of raw payloads received on a subscribed channel.
pub type PayloadStream = BoxStream<'static, String>;

/// Raw, fallible access to a coordination store.
///
/// Implementations report every failure; the fail-open policy lives in
/// [`CoordinationStore`](crate::CoordinationStore), not here.
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Reads a key. Expired keys read as `None`.
    async fn get(&self, key: &str) -> TetherResult<Option<String>>;

    /// Writes a key with a time-to-live, replacing any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<()>;

    /// Writes a key with a time-to-live only if it does not exist.
    /// Returns `true` when the write happened.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<bool>;

    /// Rewrites a key with a fresh time-to-live only if it still exists.
    /// Returns `true` when the write happened.
    async fn set_xx_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<bool>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> TetherResult<()>;

    /// Publishes a payload to every current subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> TetherResult<()>;

    /// Subscribes to `channel`. The subscription is established before this
    /// returns; payloads published afterwards are yielded by the stream.
    async fn subscribe(&self, channel: &str) -> TetherResult<PayloadStream>;
}
