//! In-process generation state.

use crate::abort::AbortFlag;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tether_core::SessionId;

/// In-process state of a session's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// No generation owned by this process.
    Idle,
    /// Claimed and driving the engine.
    Running,
    /// Ran to completion; cleanup in flight.
    Finished,
    /// The engine failed; cleanup in flight.
    Errored,
    /// Stopped at a step boundary after a cancellation request.
    Aborted,
}

impl GenerationState {
    /// Whether the generation has ended (cleanup may still be in flight).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Errored | Self::Aborted)
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Errored => write!(f, "errored"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

struct Tracked {
    state: GenerationState,
    flag: AbortFlag,
}

/// Generations owned by this process, keyed by session.
///
/// An entry exists from claim to the end of cleanup; a missing entry reads
/// as `Idle`.
#[derive(Default)]
pub(crate) struct LocalGenerations {
    sessions: Mutex<HashMap<SessionId, Tracked>>,
}

impl LocalGenerations {
    pub(crate) fn begin(&self, session_id: &SessionId, flag: AbortFlag) {
        self.sessions.lock().insert(
            session_id.clone(),
            Tracked {
                state: GenerationState::Running,
                flag,
            },
        );
    }

    pub(crate) fn state(&self, session_id: &SessionId) -> GenerationState {
        self.sessions
            .lock()
            .get(session_id)
            .map_or(GenerationState::Idle, |t| t.state)
    }

    pub(crate) fn flag(&self, session_id: &SessionId) -> Option<AbortFlag> {
        self.sessions.lock().get(session_id).map(|t| t.flag.clone())
    }

    /// Moves the generation owning `flag` to `state`.
    pub(crate) fn transition(&self, session_id: &SessionId, flag: &AbortFlag, state: GenerationState) {
        if let Some(tracked) = self.sessions.lock().get_mut(session_id) {
            if tracked.flag.same_as(flag) {
                tracked.state = state;
            }
        }
    }

    /// Forgets the generation owning `flag`; the session reads as `Idle`.
    pub(crate) fn end(&self, session_id: &SessionId, flag: &AbortFlag) {
        let mut sessions = self.sessions.lock();
        if sessions.get(session_id).is_some_and(|t| t.flag.same_as(flag)) {
            sessions.remove(session_id);
        }
    }
}
