//! Generation lifecycle: claim, heartbeat, cancellation and cleanup.
//!
//! A generation moves `Idle → Running → {Finished | Errored | Aborted}` and
//! back to `Idle` once its claim is cleared. The claim is an advisory,
//! TTL-backed record in the coordination store (`session:<id>:state`) that
//! any process can read to answer "is this session generating?". Cancellation
//! crosses processes through the `events:<id>` channel and by deleting the
//! claim directly; the process that owns the generation stops at the next
//! step boundary.

pub mod abort;
pub mod config;
pub mod control;
pub mod heartbeat;
mod hooks;
pub mod orchestrator;
pub mod state;

pub use abort::AbortFlag;
pub use config::LifecycleConfig;
pub use control::{is_running_state, LifecycleEvent, StopOutcome, StreamControl};
pub use heartbeat::Heartbeat;
pub use orchestrator::{GenerationHandle, StartedGeneration, StreamOrchestrator};
pub use state::GenerationState;
