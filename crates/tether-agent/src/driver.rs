//! Consumes engine events and drives the lifecycle callbacks.

use crate::config::DriverConfig;
use crate::encode::text_delta_frame;
use crate::engine::{EngineEvent, EventStream, GenerationEngine, GenerationRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use tether_core::{Message, TetherError, TetherResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Whether the driver keeps invoking the engine after a step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Keep consuming engine events.
    Continue,
    /// Stop the engine and take the abort path.
    Abort,
}

/// Callbacks invoked by the driver, in event order, inside the driving task.
///
/// Exactly one of `on_abort`, `on_error` or `on_finish` is called per run.
#[async_trait]
pub trait GenerationHooks: Send {
    /// The step boundary before the first step.
    async fn on_start(&mut self) -> StepDecision;

    /// A text chunk was produced.
    async fn on_chunk(&mut self, text: &str);

    /// Step `step` (1-based) completed.
    async fn on_step_finish(&mut self, step: u32) -> StepDecision;

    /// The run was aborted at a step boundary. `unsaved` holds the engine's
    /// not-yet-persisted messages.
    async fn on_abort(&mut self, unsaved: Vec<Message>);

    /// The engine failed.
    async fn on_error(&mut self, error: &TetherError);

    /// The engine completed.
    async fn on_finish(&mut self);
}

/// How a driven generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The engine completed, or the step budget ran out.
    Finished { steps: u32 },
    /// A hook asked to stop at a step boundary.
    Aborted { steps: u32, unsaved: usize },
    /// The engine reported an error.
    Errored { steps: u32, message: String },
}

/// Runs a [`GenerationEngine`] with the configured budgets.
pub struct GenerationDriver {
    engine: Arc<dyn GenerationEngine>,
    config: DriverConfig,
}

impl GenerationDriver {
    /// Wraps `engine` with the budgets in `config`.
    pub fn new(engine: Arc<dyn GenerationEngine>, config: DriverConfig) -> Self {
        Self { engine, config }
    }

    /// The budgets applied to every request.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Builds a request for `thread_id` carrying the configured budgets.
    pub fn request(&self, thread_id: &str, message: Message) -> GenerationRequest {
        GenerationRequest {
            thread_id: thread_id.to_string(),
            resource_id: thread_id.to_string(),
            message,
            max_steps: self.config.max_steps,
            max_retries: self.config.max_retries,
            max_output_tokens: self.config.max_output_tokens,
        }
    }

    /// Invokes the engine and checks that its output can be streamed.
    ///
    /// Fails with `MissingStreamCapability` before anything is delivered when
    /// the engine run has no event stream.
    pub async fn begin(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> TetherResult<EventStream> {
        let thread_id = request.thread_id.clone();
        let run = self.engine.generate(request, cancel).await?;
        run.into_events().inspect_err(|e| {
            error!(thread_id = %thread_id, error = %e, "Engine run cannot be streamed");
        })
    }

    /// Consumes `events`, calling `hooks` for each one and forwarding framed
    /// text to `body`.
    ///
    /// A closed `body` (every reader gone) does not stop the run; only a hook
    /// decision, the engine, or the step budget does.
    pub async fn drive<H>(
        &self,
        thread_id: &str,
        mut events: EventStream,
        cancel: CancellationToken,
        hooks: &mut H,
        body: mpsc::Sender<TetherResult<Bytes>>,
    ) -> DriveOutcome
    where
        H: GenerationHooks + ?Sized,
    {
        let mut steps = 0u32;
        let mut body_open = true;

        if hooks.on_start().await == StepDecision::Abort {
            drop(events);
            return self.abort(thread_id, steps, &cancel, hooks).await;
        }

        loop {
            match events.next().await {
                Some(Ok(EngineEvent::TextDelta { text })) => {
                    hooks.on_chunk(&text).await;
                    if body_open && body.send(Ok(text_delta_frame(&text))).await.is_err() {
                        debug!(thread_id, "Response stream closed, generation continues");
                        body_open = false;
                    }
                }
                Some(Ok(EngineEvent::StepFinish { .. })) => {
                    steps += 1;
                    if hooks.on_step_finish(steps).await == StepDecision::Abort {
                        drop(events);
                        return self.abort(thread_id, steps, &cancel, hooks).await;
                    }
                    if steps >= self.config.max_steps {
                        warn!(thread_id, steps, "Step budget exhausted, stopping engine");
                        cancel.cancel();
                        hooks.on_finish().await;
                        return DriveOutcome::Finished { steps };
                    }
                }
                Some(Ok(EngineEvent::Finish)) | None => {
                    info!(thread_id, steps, "Generation finished");
                    hooks.on_finish().await;
                    return DriveOutcome::Finished { steps };
                }
                Some(Err(e)) => {
                    error!(thread_id, steps, error = %e, "Generation failed");
                    hooks.on_error(&e).await;
                    return DriveOutcome::Errored {
                        steps,
                        message: e.to_string(),
                    };
                }
            }
        }
    }

    async fn abort<H>(
        &self,
        thread_id: &str,
        steps: u32,
        cancel: &CancellationToken,
        hooks: &mut H,
    ) -> DriveOutcome
    where
        H: GenerationHooks + ?Sized,
    {
        info!(thread_id, steps, "Aborting generation at step boundary");
        cancel.cancel();
        let unsaved = match self.engine.unsaved_messages(thread_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(thread_id, error = %e, "Failed to fetch unsaved messages");
                Vec::new()
            }
        };
        let count = unsaved.len();
        hooks.on_abort(unsaved).await;
        DriveOutcome::Aborted {
            steps,
            unsaved: count,
        }
    }
}
