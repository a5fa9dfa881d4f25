//! Short-lived hand-off of an initial message between two requests.
//!
//! The page that collects the first prompt parks it here and navigates to the
//! page that creates the session; that page takes it back exactly once.

use crate::client::{CoordinationStore, Lookup};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tether_core::{PendingMessage, TetherResult};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifetime of a parked message.
pub const STASH_TTL: Duration = Duration::from_secs(3600);

/// Parks [`PendingMessage`]s in the coordination store, falling back to a
/// process-local map whenever the store rejects the write.
pub struct MessageStash {
    store: CoordinationStore,
    fallback: Mutex<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl MessageStash {
    /// Creates a stash with the default one hour TTL.
    pub fn new(store: CoordinationStore) -> Self {
        Self::with_ttl(store, STASH_TTL)
    }

    /// Creates a stash with a custom TTL.
    pub fn with_ttl(store: CoordinationStore, ttl: Duration) -> Self {
        Self {
            store,
            fallback: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Parks a message and returns its reference id.
    pub async fn put(&self, message: &PendingMessage) -> TetherResult<String> {
        let id = format!(
            "initial_msg_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..12]
        );
        let data = serde_json::to_string(message)?;

        if self.store.set_with_ttl(&id, &data, self.ttl).await {
            info!(
                message_id = %id,
                template_id = %message.template_id,
                parts = message.parts.len(),
                "Stored initial message in coordination store"
            );
        } else {
            warn!(message_id = %id, "Coordination store unavailable, using in-memory fallback");
            let mut fallback = self.fallback.lock();
            let now = Instant::now();
            fallback.retain(|_, (_, expires_at)| *expires_at > now);
            fallback.insert(id.clone(), (data, now + self.ttl));
        }
        Ok(id)
    }

    /// Takes a parked message back. A message can be taken only once.
    pub async fn take(&self, id: &str) -> TetherResult<Option<PendingMessage>> {
        let data = match self.store.lookup(id).await {
            Lookup::Present(data) => {
                self.store.delete(id).await;
                Some(data)
            }
            Lookup::Absent | Lookup::Unavailable => self.take_fallback(id),
        };

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => {
                info!(message_id = %id, "Initial message not found");
                Ok(None)
            }
        }
    }

    fn take_fallback(&self, id: &str) -> Option<String> {
        let (data, expires_at) = self.fallback.lock().remove(id)?;
        (expires_at > Instant::now()).then_some(data)
    }
}
