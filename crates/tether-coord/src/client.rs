//! Fail-open coordination store handle.

use crate::backend::CoordinationBackend;
use crate::config::CoordinationConfig;
use crate::memory::MemoryBackend;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of reading a key when the caller must tell "absent" from "unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The key exists with this value.
    Present(String),
    /// The key does not exist (or expired).
    Absent,
    /// The store could not be asked.
    Unavailable,
}

impl Lookup {
    /// Collapses to the neutral read result: `None` for absent or unavailable.
    pub fn into_option(self) -> Option<String> {
        match self {
            Lookup::Present(v) => Some(v),
            Lookup::Absent | Lookup::Unavailable => None,
        }
    }
}

/// Result of a write-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The key was written.
    Acquired,
    /// Another writer already holds the key.
    Held,
    /// The store could not be asked; the caller decides whether to proceed.
    Unavailable,
}

/// A live subscription. Dropping it stops the listener task.
pub struct Subscription {
    channel: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// The subscribed channel.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fail-open handle on the coordination store.
///
/// Construct one per process and share it by cloning; clones use the same
/// backend and the same cached connection. There is no shutdown step.
/// Every operation catches backend failures, logs them, and returns a neutral
/// result (`None`, `false`, no-op) so callers never treat the store as a hard
/// dependency. A store without a backend answers everything neutrally.
#[derive(Clone)]
pub struct CoordinationStore {
    backend: Option<Arc<dyn CoordinationBackend>>,
}

impl CoordinationStore {
    /// Wraps an explicit backend.
    pub fn new(backend: Arc<dyn CoordinationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store that is never reachable.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// A process-local store (single-process mode).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Builds the store from configuration.
    ///
    /// No URL degrades to an in-memory store; a malformed URL degrades to a
    /// disabled store. Neither fails startup.
    pub fn from_config(config: &CoordinationConfig) -> Self {
        let Some(url) = config.url.as_deref() else {
            warn!("No coordination store configured; cross-process cancellation is disabled");
            return Self::in_memory();
        };
        Self::connect(url)
    }

    #[cfg(feature = "redis")]
    fn connect(url: &str) -> Self {
        match crate::redis_backend::RedisBackend::new(url) {
            Ok(backend) => {
                info!("Coordination store configured (connects lazily)");
                Self::new(Arc::new(backend))
            }
            Err(e) => {
                warn!(error = %e, "Invalid coordination store URL; coordination disabled");
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    fn connect(_url: &str) -> Self {
        warn!("Built without the `redis` feature; coordination disabled");
        Self::disabled()
    }

    /// Whether a backend is attached.
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Reads a key, distinguishing absent from unreachable.
    pub async fn lookup(&self, key: &str) -> Lookup {
        let Some(backend) = &self.backend else {
            return Lookup::Unavailable;
        };
        match backend.get(key).await {
            Ok(Some(v)) => Lookup::Present(v),
            Ok(None) => Lookup::Absent,
            Err(e) => {
                warn!(key, error = %e, "Failed to read from coordination store");
                Lookup::Unavailable
            }
        }
    }

    /// Reads a key; `None` when absent or when the store is unreachable.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).await.into_option()
    }

    /// Writes a key with a TTL. Returns whether the write landed.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.set_ex(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to write to coordination store");
                false
            }
        }
    }

    /// Writes a key with a TTL only if no live value exists.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> ClaimOutcome {
        let Some(backend) = &self.backend else {
            return ClaimOutcome::Unavailable;
        };
        match backend.set_nx_ex(key, value, ttl).await {
            Ok(true) => ClaimOutcome::Acquired,
            Ok(false) => ClaimOutcome::Held,
            Err(e) => {
                warn!(key, error = %e, "Failed to claim key in coordination store");
                ClaimOutcome::Unavailable
            }
        }
    }

    /// Refreshes the TTL of a key that still exists. Returns whether the key
    /// was live and rewritten; an absent key is never recreated.
    pub async fn extend_ttl(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.set_xx_ex(key, value, ttl).await {
            Ok(written) => written,
            Err(e) => {
                warn!(key, error = %e, "Failed to refresh key in coordination store");
                false
            }
        }
    }

    /// Deletes a key. Returns whether the delete reached the store.
    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.del(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to delete from coordination store");
                false
            }
        }
    }

    /// Publishes a payload. Returns whether the publish reached the store;
    /// delivery to subscribers is never confirmed.
    pub async fn publish(&self, channel: &str, payload: &str) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.publish(channel, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel, error = %e, "Failed to publish to coordination store");
                false
            }
        }
    }

    /// Subscribes `handler` to `channel`.
    ///
    /// The subscription is active when this returns. The handler runs on a
    /// spawned task for every payload until the returned guard is dropped or
    /// the channel closes. `None` when the store is unreachable.
    pub async fn subscribe<F>(&self, channel: &str, handler: F) -> Option<Subscription>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let backend = self.backend.as_ref()?;
        let mut payloads = match backend.subscribe(channel).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(channel, error = %e, "Failed to subscribe to coordination store");
                return None;
            }
        };

        let name = channel.to_string();
        let task = tokio::spawn(async move {
            while let Some(payload) = payloads.next().await {
                handler(payload);
            }
            debug!(channel = %name, "Subscription stream ended");
        });

        Some(Subscription {
            channel: channel.to_string(),
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_store() -> (CoordinationStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (CoordinationStore::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_reads_and_writes() {
        let (store, _) = memory_store();
        let ttl = Duration::from_secs(15);
        assert_eq!(store.lookup("k").await, Lookup::Absent);
        assert!(store.set_with_ttl("k", "running", ttl).await);
        assert_eq!(store.get("k").await.as_deref(), Some("running"));
        assert_eq!(store.set_if_absent("k", "x", ttl).await, ClaimOutcome::Held);
        assert!(store.extend_ttl("k", "running", ttl).await);
        assert!(store.delete("k").await);
        assert!(store.delete("k").await);
        assert!(!store.extend_ttl("k", "running", ttl).await);
        assert_eq!(store.lookup("k").await, Lookup::Absent);
        assert_eq!(store.set_if_absent("k", "x", ttl).await, ClaimOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_unreachable_store_answers_neutrally() {
        let (store, backend) = memory_store();
        backend.set_reachable(false);
        let ttl = Duration::from_secs(15);

        assert_eq!(store.lookup("k").await, Lookup::Unavailable);
        assert_eq!(store.get("k").await, None);
        assert!(!store.set_with_ttl("k", "v", ttl).await);
        assert_eq!(store.set_if_absent("k", "v", ttl).await, ClaimOutcome::Unavailable);
        assert!(!store.extend_ttl("k", "v", ttl).await);
        assert!(!store.delete("k").await);
        assert!(!store.publish("c", "p").await);
        assert!(store.subscribe("c", |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_answers_neutrally() {
        let store = CoordinationStore::disabled();
        assert!(!store.is_enabled());
        assert_eq!(store.lookup("k").await, Lookup::Unavailable);
        assert!(!store.publish("c", "p").await);
        assert!(store.subscribe("c", |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_delivers_until_dropped() {
        let (store, backend) = memory_store();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = store
            .subscribe("events:s", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(sub.channel(), "events:s");

        assert!(store.publish("events:s", "one").await);
        assert!(store.publish("events:s", "two").await);
        for _ in 0..10 {
            if seen.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        drop(sub);
        for _ in 0..10 {
            if backend.subscriber_count("events:s") == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.subscriber_count("events:s"), 0);
    }

    #[test]
    fn test_missing_url_falls_back_to_memory() {
        let store = CoordinationStore::from_config(&CoordinationConfig::default());
        assert!(store.is_enabled());
    }
}
