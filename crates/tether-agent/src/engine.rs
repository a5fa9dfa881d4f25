//! The generation engine seam and its event types.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tether_core::{Message, TetherError, TetherResult};
use tokio_util::sync::CancellationToken;

/// Events produced by a generation engine, in order.
///
/// A run ends with [`EngineEvent::Finish`], with the end of the stream, or
/// with an `Err` item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A chunk of assistant text.
    TextDelta {
        /// The chunk, in emission order.
        text: String,
    },

    /// A step (one model call plus its tool calls) completed.
    StepFinish {
        /// One-based index of the finished step.
        step: u32,
    },

    /// The generation completed normally.
    Finish,
}

/// Ordered engine output.
pub type EventStream = BoxStream<'static, TetherResult<EngineEvent>>;

/// What the engine hands back when invoked.
pub struct EngineRun {
    events: Option<EventStream>,
}

impl EngineRun {
    /// A run whose output can be streamed.
    pub fn streaming(events: EventStream) -> Self {
        Self {
            events: Some(events),
        }
    }

    /// A run that produced no streamable output (e.g. a non-streaming mode).
    pub fn without_stream() -> Self {
        Self { events: None }
    }

    /// The event stream, or `MissingStreamCapability` if there is none.
    pub fn into_events(self) -> TetherResult<EventStream> {
        self.events.ok_or_else(|| {
            TetherError::MissingStreamCapability(
                "engine run does not expose an event stream".to_string(),
            )
        })
    }
}

/// Parameters for one generation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Conversation thread the output belongs to.
    pub thread_id: String,
    /// Owner of the thread.
    pub resource_id: String,
    /// The new user message.
    pub message: Message,
    /// Step budget; the driver stops the engine once it is spent.
    pub max_steps: u32,
    /// Retries the engine may attempt internally.
    pub max_retries: u32,
    /// Output token budget.
    pub max_output_tokens: u32,
}

/// The external generation engine.
///
/// Required capabilities: produce ordered output events, expose the
/// transcript entries it has not persisted yet, and stop when the given
/// cancellation token fires.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Starts a generation. The returned stream is lazy: no step runs until
    /// it is polled.
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> TetherResult<EngineRun>;

    /// Takes the messages produced for `thread_id` that have not been
    /// persisted yet. A second call returns only what was produced since.
    async fn unsaved_messages(&self, thread_id: &str) -> TetherResult<Vec<Message>>;
}
