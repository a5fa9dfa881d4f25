//! Generation claims on the coordination store.

use crate::config::LifecycleConfig;
use tether_coord::{ClaimOutcome, CoordinationStore, Lookup};
use tether_core::{ControlEvent, SessionId};
use tracing::{debug, info, warn};

/// Value stored under the claim key while a generation runs.
pub const RUNNING: &str = "running";

/// Whether a raw claim value marks a running generation.
pub fn is_running_state(state: Option<&str>) -> bool {
    state == Some(RUNNING)
}

/// Result of waiting for a generation to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The claim is gone, or the store could not be asked.
    Stopped,
    /// The claim was still present after the polling bound.
    TimedOut,
}

/// Externally driven lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Write (or refresh) the claim.
    Start,
    /// Clear the claim after normal completion.
    Finish,
    /// Clear the claim after a failure.
    Error,
}

/// Claim and control-channel operations on the coordination store.
///
/// Stateless apart from the store handle, so any process holding the same
/// store can inspect and cancel any session.
#[derive(Clone)]
pub struct StreamControl {
    store: CoordinationStore,
    config: LifecycleConfig,
}

impl StreamControl {
    /// Creates a control handle over `store`.
    pub fn new(store: CoordinationStore, config: LifecycleConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &CoordinationStore {
        &self.store
    }

    /// Claim and polling timing.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Raw claim value, `None` when absent or the store is unreachable.
    pub async fn stream_state(&self, session_id: &SessionId) -> Option<String> {
        self.store.get(&session_id.state_key()).await
    }

    /// Whether a claim currently exists for the session.
    pub async fn is_stream_running(&self, session_id: &SessionId) -> bool {
        is_running_state(self.stream_state(session_id).await.as_deref())
    }

    /// Writes the claim only if no generation holds it.
    pub async fn claim(&self, session_id: &SessionId) -> ClaimOutcome {
        self.store
            .set_if_absent(&session_id.state_key(), RUNNING, self.config.claim_ttl())
            .await
    }

    /// Refreshes a live claim with a full TTL.
    ///
    /// Never recreates a claim that was deleted or expired; returns `false`
    /// in that case, and when the store is unreachable.
    pub async fn update_keep_alive(&self, session_id: &SessionId) -> bool {
        debug!(session_id = %session_id, "Refreshing generation claim");
        self.store
            .extend_ttl(&session_id.state_key(), RUNNING, self.config.claim_ttl())
            .await
    }

    /// Deletes the claim. Safe to repeat.
    pub async fn clear_stream_state(&self, session_id: &SessionId) -> bool {
        self.store.delete(&session_id.state_key()).await
    }

    /// Applies an externally driven transition: `Start` writes the claim
    /// unconditionally, `Finish` and `Error` delete it.
    pub async fn handle_stream_lifecycle(&self, session_id: &SessionId, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Start => {
                self.store
                    .set_with_ttl(&session_id.state_key(), RUNNING, self.config.claim_ttl())
                    .await;
            }
            LifecycleEvent::Finish | LifecycleEvent::Error => {
                self.clear_stream_state(session_id).await;
            }
        }
    }

    /// Asks whichever process owns the generation to stop.
    ///
    /// Publishes `abort-stream` on the session's channel, then deletes the
    /// claim directly so the session reads as stopped even if no owner is
    /// listening.
    pub async fn stop_stream(&self, session_id: &SessionId) {
        info!(session_id = %session_id, "Stopping generation");
        self.store
            .publish(
                &session_id.events_channel(),
                &ControlEvent::AbortStream.to_payload(),
            )
            .await;
        self.clear_stream_state(session_id).await;
    }

    /// Polls the claim until it is gone.
    ///
    /// `Stopped` as soon as the claim is absent, or immediately when the
    /// store cannot be asked; `TimedOut` after `poll_attempts` reads.
    pub async fn wait_for_stream_to_stop(&self, session_id: &SessionId) -> StopOutcome {
        let key = session_id.state_key();
        for attempt in 0..self.config.poll_attempts {
            match self.store.lookup(&key).await {
                Lookup::Absent => return StopOutcome::Stopped,
                Lookup::Unavailable => {
                    warn!(session_id = %session_id, "Store unavailable, assuming generation stopped");
                    return StopOutcome::Stopped;
                }
                Lookup::Present(_) => {
                    debug!(session_id = %session_id, attempt, "Generation still running");
                }
            }
            if attempt + 1 < self.config.poll_attempts {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }
        warn!(session_id = %session_id, "Timed out waiting for generation to stop");
        StopOutcome::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tether_coord::MemoryBackend;

    fn control() -> (StreamControl, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CoordinationStore::new(backend.clone());
        (StreamControl::new(store, LifecycleConfig::default()), backend)
    }

    #[tokio::test]
    async fn test_claim_lifecycle() {
        let (control, backend) = control();
        let id = SessionId::from("s1");

        assert!(!control.is_stream_running(&id).await);
        assert_eq!(control.claim(&id).await, ClaimOutcome::Acquired);
        assert_eq!(control.claim(&id).await, ClaimOutcome::Held);
        assert_eq!(control.stream_state(&id).await.as_deref(), Some("running"));
        assert!(backend.ttl(&id.state_key()).unwrap() <= Duration::from_secs(15));

        control
            .handle_stream_lifecycle(&id, LifecycleEvent::Finish)
            .await;
        assert!(!control.is_stream_running(&id).await);
        assert!(control.clear_stream_state(&id).await);

        control
            .handle_stream_lifecycle(&id, LifecycleEvent::Start)
            .await;
        assert!(control.is_stream_running(&id).await);
    }

    #[test]
    fn test_only_the_running_marker_reads_as_running() {
        assert!(is_running_state(Some("running")));
        assert!(!is_running_state(Some("finished")));
        assert!(!is_running_state(Some("")));
        assert!(!is_running_state(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_never_recreates_a_cleared_claim() {
        let (control, backend) = control();
        let id = SessionId::from("s1");
        control.claim(&id).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(control.update_keep_alive(&id).await);
        assert_eq!(backend.ttl(&id.state_key()), Some(Duration::from_secs(15)));

        control.stop_stream(&id).await;
        assert!(!control.update_keep_alive(&id).await);
        assert!(!control.is_stream_running(&id).await);
    }

    #[tokio::test]
    async fn test_stop_stream_publishes_and_clears() {
        let (control, _) = control();
        let id = SessionId::from("s1");
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = received.clone();
        let _sub = control
            .store()
            .subscribe(&id.events_channel(), move |p| sink.lock().push(p))
            .await
            .unwrap();
        control.claim(&id).await;

        control.stop_stream(&id).await;

        assert!(!control.is_stream_running(&id).await);
        for _ in 0..20 {
            if !received.lock().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(received.lock().as_slice(), [r#"{"type":"abort-stream"}"#]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_on_held_claim() {
        let (control, _) = control();
        let id = SessionId::from("stuck");
        control
            .store()
            .set_with_ttl(&id.state_key(), "running", Duration::from_secs(600))
            .await;

        let started = tokio::time::Instant::now();
        assert_eq!(
            control.wait_for_stream_to_stop(&id).await,
            StopOutcome::TimedOut
        );
        assert_eq!(started.elapsed(), Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sees_expiry() {
        let (control, _) = control();
        let id = SessionId::from("crashed");
        control.claim(&id).await;

        assert_eq!(
            control.wait_for_stream_to_stop(&id).await,
            StopOutcome::Stopped
        );
    }

    #[tokio::test]
    async fn test_wait_fails_open() {
        let (control, backend) = control();
        let id = SessionId::from("s1");
        control.claim(&id).await;
        backend.set_reachable(false);
        assert_eq!(
            control.wait_for_stream_to_stop(&id).await,
            StopOutcome::Stopped
        );

        let disabled = StreamControl::new(CoordinationStore::disabled(), LifecycleConfig::default());
        assert_eq!(
            disabled.wait_for_stream_to_stop(&id).await,
            StopOutcome::Stopped
        );
    }
}
