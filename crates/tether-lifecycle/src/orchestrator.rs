//! Starting, resuming and cancelling generations.

use crate::abort::{subscribe_abort, AbortFlag};
use crate::config::LifecycleConfig;
use crate::control::{StopOutcome, StreamControl};
use crate::heartbeat::Heartbeat;
use crate::hooks::{ClaimGuard, LifecycleHooks};
use crate::state::{GenerationState, LocalGenerations};
use futures_util::StreamExt;
use std::sync::Arc;
use tether_agent::{DriveOutcome, DriverConfig, GenerationDriver, GenerationEngine};
use tether_coord::{ClaimOutcome, CoordinationStore};
use tether_core::{Message, SessionId, TetherError, TetherResult};
use tether_session::ConversationStore;
use tether_stream::{ResumableReader, ResumableStream, StreamRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Frames buffered between the driver and the registry pump.
const BODY_BUFFER: usize = 64;

/// Completion handle of a driving task.
pub struct GenerationHandle {
    task: JoinHandle<DriveOutcome>,
}

impl GenerationHandle {
    /// Waits until the generation ends and its cleanup has run.
    pub async fn wait(self) -> TetherResult<DriveOutcome> {
        self.task
            .await
            .map_err(|e| TetherError::Engine(format!("generation task failed: {e}")))
    }

    /// Whether the driving task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// A generation that has been claimed, registered and started.
pub struct StartedGeneration {
    /// The registered stream, read from the first chunk.
    pub stream: ResumableStream,
    /// Resolves once the generation ended and cleanup ran.
    pub handle: GenerationHandle,
}

/// Owns the generation lifecycle for every session served by this process.
///
/// Cheap to clone; clones share the registry, the store handle and the
/// in-process state.
#[derive(Clone)]
pub struct StreamOrchestrator {
    control: StreamControl,
    registry: StreamRegistry,
    driver: Arc<GenerationDriver>,
    conversations: Arc<dyn ConversationStore>,
    local: Arc<LocalGenerations>,
}

impl StreamOrchestrator {
    /// Builds an orchestrator with an empty registry and no local generations.
    pub fn new(
        store: CoordinationStore,
        engine: Arc<dyn GenerationEngine>,
        conversations: Arc<dyn ConversationStore>,
        lifecycle: LifecycleConfig,
        driver: DriverConfig,
    ) -> Self {
        Self {
            control: StreamControl::new(store, lifecycle),
            registry: StreamRegistry::new(),
            driver: Arc::new(GenerationDriver::new(engine, driver)),
            conversations,
            local: Arc::new(LocalGenerations::default()),
        }
    }

    /// Claim and control-channel operations, shared with other processes.
    pub fn control(&self) -> &StreamControl {
        &self.control
    }

    /// This process's resumable streams.
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Starts a generation for `message` and registers its output stream.
    ///
    /// Fails with `InvalidMessage` for an unusable message, with
    /// `GenerationInProgress` while another generation holds the session, and
    /// with `MissingStreamCapability` when the engine cannot stream; in every
    /// failure case nothing is registered and the claim is not left behind.
    /// When the store is unreachable the generation starts unclaimed.
    pub async fn start(
        &self,
        session_id: &SessionId,
        message: Message,
    ) -> TetherResult<StartedGeneration> {
        message.validate()?;

        if self.local.state(session_id) != GenerationState::Idle
            || self.registry.has_existing_stream(session_id)
        {
            return Err(TetherError::GenerationInProgress(session_id.clone()));
        }

        match self.control.claim(session_id).await {
            ClaimOutcome::Acquired => {}
            ClaimOutcome::Held => {
                warn!(session_id = %session_id, "Generation already running elsewhere");
                return Err(TetherError::GenerationInProgress(session_id.clone()));
            }
            ClaimOutcome::Unavailable => {
                warn!(session_id = %session_id, "Coordination store unavailable, starting unclaimed");
            }
        }
        let flag = AbortFlag::new();
        let mut claim = ClaimGuard::begin(
            self.control.clone(),
            self.local.clone(),
            session_id.clone(),
            flag.clone(),
        );
        let subscription = subscribe_abort(
            self.control.store(),
            session_id,
            flag.clone(),
            self.registry.clone(),
        )
        .await;

        let cancel = CancellationToken::new();
        let request = self.driver.request(session_id.as_str(), message);
        let events = match self.driver.begin(request, cancel.clone()).await {
            Ok(events) => events,
            Err(e) => {
                claim.release().await;
                return Err(e);
            }
        };

        let (body, rx) = mpsc::channel(BODY_BUFFER);
        let stream = self
            .registry
            .create_new_resumable_stream(session_id, move || ReceiverStream::new(rx).boxed());

        let mut hooks = LifecycleHooks {
            session_id: session_id.clone(),
            control: self.control.clone(),
            flag,
            heartbeat: Heartbeat::new(self.control.config().heartbeat_interval()),
            conversations: self.conversations.clone(),
            local: self.local.clone(),
            claim,
            subscription,
        };
        let driver = self.driver.clone();
        let thread_id = session_id.clone();
        let task = tokio::spawn(async move {
            driver
                .drive(thread_id.as_str(), events, cancel, &mut hooks, body)
                .await
        });

        info!(session_id = %session_id, "Generation started");
        Ok(StartedGeneration {
            stream,
            handle: GenerationHandle { task },
        })
    }

    /// Joins the session's open stream at the live point.
    ///
    /// `Ok(None)` when no stream is open; `StreamResume` when the stream
    /// closed between the existence check and the join.
    pub fn resume(&self, session_id: &SessionId) -> TetherResult<Option<ResumableReader>> {
        if !self.registry.has_existing_stream(session_id) {
            return Ok(None);
        }
        self.registry
            .resume_existing_stream(session_id)
            .map(Some)
            .ok_or_else(|| TetherError::StreamResume(session_id.clone()))
    }

    /// Requests cancellation of the session's generation, wherever it runs.
    ///
    /// Returns whether this process owns the generation; in that case it
    /// stops at the next step boundary even if the control channel is down.
    pub async fn cancel(&self, session_id: &SessionId) -> bool {
        let owned = match self.local.flag(session_id) {
            Some(flag) => {
                flag.raise();
                self.registry.cancel(session_id);
                true
            }
            None => false,
        };
        self.control.stop_stream(session_id).await;
        owned
    }

    /// Whether any process holds the session's claim.
    pub async fn is_stream_running(&self, session_id: &SessionId) -> bool {
        self.control.is_stream_running(session_id).await
    }

    /// Raw claim value, `None` when absent or unreachable.
    pub async fn stream_state(&self, session_id: &SessionId) -> Option<String> {
        self.control.stream_state(session_id).await
    }

    /// Polls until the session's claim is gone.
    pub async fn wait_for_stream_to_stop(&self, session_id: &SessionId) -> StopOutcome {
        self.control.wait_for_stream_to_stop(session_id).await
    }

    /// State of the generation this process owns for the session.
    pub fn local_state(&self, session_id: &SessionId) -> GenerationState {
        self.local.state(session_id)
    }
}
