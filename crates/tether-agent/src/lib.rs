//! Generation engine seam and the driver that runs it.
//!
//! The engine is an external collaborator that turns a user message into a
//! sequence of [`EngineEvent`]s. The [`GenerationDriver`] invokes it with the
//! configured budgets, delivers every event to a [`GenerationHooks`]
//! implementation inside the driving task, and frames text deltas for the
//! response stream.

pub mod config;
pub mod driver;
pub mod encode;
pub mod engine;
pub mod scripted;

pub use config::DriverConfig;
pub use driver::{DriveOutcome, GenerationDriver, GenerationHooks, StepDecision};
pub use engine::{EngineEvent, EngineRun, EventStream, GenerationEngine, GenerationRequest};
pub use scripted::{EngineStats, ScriptedEngine};
