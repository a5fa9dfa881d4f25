//! A deterministic engine that plays back a script.
//!
//! Used by the demo server (echo mode) and throughout the test suites.

use crate::engine::{EngineEvent, EngineRun, GenerationEngine, GenerationRequest};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{Message, TetherError, TetherResult};
use tether_session::ConversationStore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone)]
enum Script {
    /// Fixed steps, each a list of chunks.
    Steps(Vec<Vec<String>>),
    /// One step per line of the user's text, one chunk per word.
    Echo,
}

/// Counters observed by tests.
#[derive(Debug, Default)]
pub struct EngineStats {
    invocations: AtomicU32,
    steps_completed: AtomicU32,
    chunks_emitted: AtomicU32,
    unsaved_fetches: AtomicU32,
}

impl EngineStats {
    /// Calls to `generate`.
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Steps that ran to completion.
    pub fn steps_completed(&self) -> u32 {
        self.steps_completed.load(Ordering::SeqCst)
    }

    /// Text chunks emitted.
    pub fn chunks_emitted(&self) -> u32 {
        self.chunks_emitted.load(Ordering::SeqCst)
    }

    /// Calls to `unsaved_messages`.
    pub fn unsaved_fetches(&self) -> u32 {
        self.unsaved_fetches.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Shared {
    stats: EngineStats,
    unsaved: Mutex<HashMap<String, Vec<Message>>>,
}

impl Shared {
    fn record(&self, thread_id: &str, message: Message) {
        self.unsaved
            .lock()
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
    }

    fn take(&self, thread_id: &str) -> Vec<Message> {
        self.unsaved.lock().remove(thread_id).unwrap_or_default()
    }

    /// What a real engine does when a run completes: write its transcript.
    async fn persist(&self, thread_id: &str, memory: Option<&Arc<dyn ConversationStore>>) {
        let messages = self.take(thread_id);
        if let Some(memory) = memory {
            if let Err(e) = memory.append(thread_id, &messages).await {
                warn!(thread_id, error = %e, "Scripted engine failed to persist transcript");
            }
        }
    }
}

/// Plays back scripted steps as engine events.
///
/// The user message and each completed step's text are kept as unsaved
/// transcript entries until the run finishes (when they are persisted to the
/// optional memory store) or until `unsaved_messages` takes them.
pub struct ScriptedEngine {
    script: Script,
    chunk_delay: Duration,
    fail_at_step: Option<u32>,
    streaming: bool,
    memory: Option<Arc<dyn ConversationStore>>,
    shared: Arc<Shared>,
}

impl ScriptedEngine {
    /// Plays back `steps`, each a list of chunks.
    pub fn new<S: Into<String>>(steps: Vec<Vec<S>>) -> Self {
        let steps = steps
            .into_iter()
            .map(|step| step.into_iter().map(Into::into).collect())
            .collect();
        Self::with_script(Script::Steps(steps))
    }

    /// Echoes the user's text back word by word.
    pub fn echo() -> Self {
        Self::with_script(Script::Echo)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            chunk_delay: Duration::ZERO,
            fail_at_step: None,
            streaming: true,
            memory: None,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Waits `delay` before every chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Fails instead of starting step `step` (0-based).
    pub fn failing_at_step(mut self, step: u32) -> Self {
        self.fail_at_step = Some(step);
        self
    }

    /// Produces runs that expose no event stream.
    pub fn without_stream(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Persists finished transcripts to `memory`.
    pub fn with_memory(mut self, memory: Arc<dyn ConversationStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Counters for this engine.
    pub fn stats(&self) -> &EngineStats {
        &self.shared.stats
    }

    fn steps_for(&self, message: &Message) -> Vec<Vec<String>> {
        match &self.script {
            Script::Steps(steps) => steps.clone(),
            Script::Echo => {
                let text = message.text();
                let steps: Vec<Vec<String>> = text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|line| {
                        line.split_whitespace()
                            .map(|w| format!("{w} "))
                            .collect()
                    })
                    .collect();
                if steps.is_empty() {
                    vec![vec![format!("Received {} file(s).", message.file_count())]]
                } else {
                    steps
                }
            }
        }
    }
}

struct Playback {
    shared: Arc<Shared>,
    memory: Option<Arc<dyn ConversationStore>>,
    thread_id: String,
    user_message: Option<Message>,
    steps: Vec<Vec<String>>,
    step: usize,
    chunk: usize,
    step_text: String,
    chunk_delay: Duration,
    fail_at_step: Option<u32>,
    cancel: CancellationToken,
    done: bool,
}

impl Playback {
    async fn next_event(&mut self) -> Option<TetherResult<EngineEvent>> {
        if self.done || self.cancel.is_cancelled() {
            return None;
        }
        if let Some(message) = self.user_message.take() {
            self.shared.record(&self.thread_id, message);
        }
        if self.fail_at_step == Some(self.step as u32) {
            self.done = true;
            return Some(Err(TetherError::Engine(format!(
                "scripted failure at step {}",
                self.step
            ))));
        }
        if self.step >= self.steps.len() {
            self.done = true;
            self.shared
                .persist(&self.thread_id, self.memory.as_ref())
                .await;
            return Some(Ok(EngineEvent::Finish));
        }

        if let Some(text) = self.steps[self.step].get(self.chunk).cloned() {
            if !self.chunk_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.chunk_delay) => {}
                    _ = self.cancel.cancelled() => return None,
                }
            }
            self.chunk += 1;
            self.step_text.push_str(&text);
            self.shared.stats.chunks_emitted.fetch_add(1, Ordering::SeqCst);
            return Some(Ok(EngineEvent::TextDelta { text }));
        }

        let text = std::mem::take(&mut self.step_text);
        if !text.is_empty() {
            self.shared.record(&self.thread_id, Message::assistant(text));
        }
        self.step += 1;
        self.chunk = 0;
        self.shared.stats.steps_completed.fetch_add(1, Ordering::SeqCst);
        Some(Ok(EngineEvent::StepFinish {
            step: self.step as u32,
        }))
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> TetherResult<EngineRun> {
        self.shared.stats.invocations.fetch_add(1, Ordering::SeqCst);
        if !self.streaming {
            return Ok(EngineRun::without_stream());
        }

        let mut steps = self.steps_for(&request.message);
        steps.truncate(request.max_steps as usize);

        let playback = Playback {
            shared: self.shared.clone(),
            memory: self.memory.clone(),
            thread_id: request.thread_id,
            user_message: Some(request.message),
            steps,
            step: 0,
            chunk: 0,
            step_text: String::new(),
            chunk_delay: self.chunk_delay,
            fail_at_step: self.fail_at_step,
            cancel,
            done: false,
        };

        let events = futures_util::stream::unfold(playback, |mut playback| async move {
            playback
                .next_event()
                .await
                .map(|event| (event, playback))
        });
        Ok(EngineRun::streaming(events.boxed()))
    }

    async fn unsaved_messages(&self, thread_id: &str) -> TetherResult<Vec<Message>> {
        self.shared
            .stats
            .unsaved_fetches
            .fetch_add(1, Ordering::SeqCst);
        Ok(self.shared.take(thread_id))
    }
}
