//! Process-local coordination backend.

use crate::backend::{CoordinationBackend, PayloadStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tether_core::{TetherError, TetherResult};
use tokio::sync::broadcast;
use tokio::time::Instant;

const CHANNEL_CAPACITY: usize = 64;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process coordination store with TTL keys and broadcast pub/sub.
///
/// Used in single-process mode (no store endpoint configured) and in tests.
/// Expiry follows `tokio::time`, so paused-clock tests see keys expire.
/// [`set_reachable(false)`](MemoryBackend::set_reachable) makes every call fail
/// the way an unreachable network store would.
pub struct MemoryBackend {
    keys: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    reachable: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Remaining time-to-live of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.keys
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn check(&self) -> TetherResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TetherError::Coordination(
                "memory store marked unreachable".to_string(),
            ))
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationBackend for MemoryBackend {
    async fn get(&self, key: &str) -> TetherResult<Option<String>> {
        self.check()?;
        let now = Instant::now();
        let mut keys = self.keys.lock();
        match keys.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                keys.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<()> {
        self.check()?;
        self.keys.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<bool> {
        self.check()?;
        let now = Instant::now();
        let mut keys = self.keys.lock();
        if keys.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        keys.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set_xx_ex(&self, key: &str, value: &str, ttl: Duration) -> TetherResult<bool> {
        self.check()?;
        let now = Instant::now();
        let mut keys = self.keys.lock();
        match keys.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.value = value.to_string();
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> TetherResult<()> {
        self.check()?;
        self.keys.lock().remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> TetherResult<()> {
        self.check()?;
        if let Some(tx) = self.channels.lock().get(channel) {
            // No receivers means nobody is listening: the event is dropped.
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> TetherResult<PayloadStream> {
        self.check()?;
        let rx = self
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Subscriber lagged behind channel");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}
