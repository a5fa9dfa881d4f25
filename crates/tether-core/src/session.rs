use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a conversation/app session.
///
/// Sessions are not stored entities; the id is only a key namespace for the
/// generation claim and the control event channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a raw session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the generation claim: `session:<id>:state`.
    pub fn state_key(&self) -> String {
        format!("session:{}:state", self.0)
    }

    /// Pub/sub channel carrying control events: `events:<id>`.
    pub fn events_channel(&self) -> String {
        format!("events:{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_and_channel() {
        let id = SessionId::new("app-42");
        assert_eq!(id.state_key(), "session:app-42:state");
        assert_eq!(id.events_channel(), "events:app-42");
        assert_eq!(id.to_string(), "app-42");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = SessionId::from("s1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");
    }
}
