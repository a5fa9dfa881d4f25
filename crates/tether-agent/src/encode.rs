//! UI message stream framing.
//!
//! Each text delta becomes one server-sent event:
//! `data: {"type":"text-delta","delta":"..."}\n\n`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum UiChunk {
    TextDelta { delta: String },
}

/// Frames a text delta as a server-sent event.
pub fn text_delta_frame(text: &str) -> Bytes {
    let chunk = UiChunk::TextDelta {
        delta: text.to_string(),
    };
    // Serializing a struct with a single string field cannot fail.
    let json = serde_json::to_string(&chunk).unwrap_or_default();
    Bytes::from(format!("data: {json}\n\n"))
}

/// Extracts the delta from a frame produced by [`text_delta_frame`].
pub fn parse_text_delta(frame: &str) -> Option<String> {
    let json = frame.trim_end().strip_prefix("data: ")?;
    match serde_json::from_str::<UiChunk>(json).ok()? {
        UiChunk::TextDelta { delta } => Some(delta),
    }
}
