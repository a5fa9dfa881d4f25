use serde::{Deserialize, Serialize};

/// A fire-and-forget signal published on a session's `events:<id>` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlEvent {
    /// Ask the process driving the generation to stop at the next step boundary.
    AbortStream,
}

impl ControlEvent {
    /// Encodes the event as the JSON payload published on the channel.
    pub fn to_payload(&self) -> String {
        match self {
            ControlEvent::AbortStream => r#"{"type":"abort-stream"}"#.to_string(),
        }
    }

    /// Decodes a channel payload. Unknown or malformed payloads yield `None`.
    pub fn from_payload(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_payload_shape() {
        let payload = ControlEvent::AbortStream.to_payload();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "abort-stream");
        assert_eq!(
            serde_json::to_string(&ControlEvent::AbortStream).unwrap(),
            payload
        );
    }

    #[test]
    fn test_unknown_payload_is_ignored() {
        assert_eq!(
            ControlEvent::from_payload(r#"{"type":"abort-stream"}"#),
            Some(ControlEvent::AbortStream)
        );
        assert_eq!(ControlEvent::from_payload(r#"{"type":"ping"}"#), None);
        assert_eq!(ControlEvent::from_payload("not json"), None);
    }
}
