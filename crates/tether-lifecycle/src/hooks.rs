use crate::abort::AbortFlag;
use crate::control::StreamControl;
use crate::heartbeat::Heartbeat;
use crate::state::{GenerationState, LocalGenerations};
use async_trait::async_trait;
use std::sync::Arc;
use tether_agent::{GenerationHooks, StepDecision};
use tether_coord::Subscription;
use tether_core::{Message, SessionId, TetherError};
use tether_session::ConversationStore;
use tracing::{error, info, warn};

/// Releases a generation claim and its in-process entry exactly once.
///
/// If the guard is dropped without `release` (the driving task panicked, or
/// the `start` future was dropped mid-flight) the local entry is forgotten
/// immediately and the claim is deleted from a spawned task.
pub(crate) struct ClaimGuard {
    control: StreamControl,
    local: Arc<LocalGenerations>,
    session_id: SessionId,
    flag: AbortFlag,
    released: bool,
}

impl ClaimGuard {
    /// Records the generation as running locally and arms the guard.
    pub(crate) fn begin(
        control: StreamControl,
        local: Arc<LocalGenerations>,
        session_id: SessionId,
        flag: AbortFlag,
    ) -> Self {
        local.begin(&session_id, flag.clone());
        Self {
            control,
            local,
            session_id,
            flag,
            released: false,
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) async fn release(&mut self) {
        if self.released {
            return;
        }
        self.control.clear_stream_state(&self.session_id).await;
        self.local.end(&self.session_id, &self.flag);
        self.released = true;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(session_id = %self.session_id, "Claim released without cleanup, deleting");
        self.local.end(&self.session_id, &self.flag);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let control = self.control.clone();
            let session_id = self.session_id.clone();
            handle.spawn(async move {
                control.clear_stream_state(&session_id).await;
            });
        }
    }
}

/// Lifecycle side effects of one generation, invoked by the driver.
pub(crate) struct LifecycleHooks {
    pub(crate) session_id: SessionId,
    pub(crate) control: StreamControl,
    pub(crate) flag: AbortFlag,
    pub(crate) heartbeat: Heartbeat,
    pub(crate) conversations: Arc<dyn ConversationStore>,
    pub(crate) local: Arc<LocalGenerations>,
    pub(crate) claim: ClaimGuard,
    pub(crate) subscription: Option<Subscription>,
}

impl LifecycleHooks {
    fn step_decision(&self) -> StepDecision {
        if self.flag.is_raised() {
            StepDecision::Abort
        } else {
            StepDecision::Continue
        }
    }

    /// Clears the claim and forgets the generation. Runs at most once.
    async fn cleanup(&mut self, state: GenerationState) {
        if self.claim.is_released() {
            return;
        }
        self.local.transition(&self.session_id, &self.flag, state);
        self.subscription = None;
        self.claim.release().await;
        info!(session_id = %self.session_id, state = %state, "Generation cleaned up");
    }
}

#[async_trait]
impl GenerationHooks for LifecycleHooks {
    async fn on_start(&mut self) -> StepDecision {
        self.step_decision()
    }

    async fn on_chunk(&mut self, _text: &str) {
        // A stopped generation only runs until the next step boundary.
        if self.flag.is_raised() {
            return;
        }
        if self.heartbeat.beat() {
            self.control.update_keep_alive(&self.session_id).await;
        }
    }

    async fn on_step_finish(&mut self, _step: u32) -> StepDecision {
        self.step_decision()
    }

    async fn on_abort(&mut self, unsaved: Vec<Message>) {
        if !unsaved.is_empty() {
            match self
                .conversations
                .append(self.session_id.as_str(), &unsaved)
                .await
            {
                Ok(count) => {
                    info!(session_id = %self.session_id, count, "Saved partial output");
                }
                Err(e) => {
                    error!(session_id = %self.session_id, error = %e, "Failed to save partial output");
                }
            }
        }
        self.cleanup(GenerationState::Aborted).await;
    }

    async fn on_error(&mut self, _error: &TetherError) {
        self.cleanup(GenerationState::Errored).await;
    }

    async fn on_finish(&mut self) {
        self.cleanup(GenerationState::Finished).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use tether_coord::{ClaimOutcome, CoordinationStore};

    fn guarded(id: &SessionId) -> (ClaimGuard, StreamControl, Arc<LocalGenerations>) {
        let control = StreamControl::new(CoordinationStore::in_memory(), LifecycleConfig::default());
        let local = Arc::new(LocalGenerations::default());
        let guard = ClaimGuard::begin(control.clone(), local.clone(), id.clone(), AbortFlag::new());
        (guard, control, local)
    }

    #[tokio::test]
    async fn test_release_clears_claim_and_local_entry() {
        let id = SessionId::from("s1");
        let (mut guard, control, local) = guarded(&id);
        assert_eq!(control.claim(&id).await, ClaimOutcome::Acquired);
        assert_eq!(local.state(&id), GenerationState::Running);

        guard.release().await;
        assert!(guard.is_released());
        assert_eq!(local.state(&id), GenerationState::Idle);
        assert!(!control.is_stream_running(&id).await);
    }

    #[tokio::test]
    async fn test_dropped_guard_frees_the_session() {
        let id = SessionId::from("s1");
        let (guard, control, local) = guarded(&id);
        control.claim(&id).await;

        drop(guard);
        assert_eq!(local.state(&id), GenerationState::Idle);
        for _ in 0..20 {
            if !control.is_stream_running(&id).await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!control.is_stream_running(&id).await);
    }

    #[tokio::test]
    async fn test_stale_guard_keeps_newer_generation() {
        let id = SessionId::from("s1");
        let (guard, _control, local) = guarded(&id);
        let newer = AbortFlag::new();
        local.begin(&id, newer.clone());

        drop(guard);
        assert_eq!(local.state(&id), GenerationState::Running);
        assert!(local.flag(&id).is_some_and(|f| f.same_as(&newer)));
    }
}
