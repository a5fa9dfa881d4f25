use crate::error::{TetherError, TetherResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
    /// A system-level instruction.
    System,
}

/// One ordered piece of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A typed file reference. `url` may be a remote URL or a `data:` URI.
    File {
        /// Media type such as `image/png`.
        #[serde(rename = "mediaType")]
        media_type: String,
        /// Location of the file contents.
        url: String,
        /// Original file name, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl MessagePart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    /// Creates a file part without a file name.
    pub fn file(media_type: impl Into<String>, url: impl Into<String>) -> Self {
        MessagePart::File {
            media_type: media_type.into(),
            url: url.into(),
            filename: None,
        }
    }

    /// Whether this part is a file reference.
    pub fn is_file(&self) -> bool {
        matches!(self, MessagePart::File { .. })
    }
}

/// A chat message: a role plus ordered content parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Client supplied identifier; generated when absent.
    #[serde(default = "generate_id")]
    pub id: String,
    /// The role of the message author.
    pub role: Role,
    /// Ordered content parts.
    pub parts: Vec<MessagePart>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    /// Creates a message with a fresh id.
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: generate_id(),
            role,
            parts,
        }
    }

    /// Creates a single-part user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![MessagePart::text(text)])
    }

    /// Creates a single-part assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![MessagePart::text(text)])
    }

    /// Concatenates all text parts, separated by a blank line.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::File { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Number of file parts.
    pub fn file_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_file()).count()
    }

    /// Rejects messages that cannot be handed to an engine.
    pub fn validate(&self) -> TetherResult<()> {
        validate_parts(&self.parts)
    }
}

/// Checks a list of parts: non-empty, no empty text, files fully described.
pub fn validate_parts(parts: &[MessagePart]) -> TetherResult<()> {
    if parts.is_empty() {
        return Err(TetherError::InvalidMessage(
            "message has no parts".to_string(),
        ));
    }
    for (i, part) in parts.iter().enumerate() {
        match part {
            MessagePart::Text { text } if text.trim().is_empty() => {
                return Err(TetherError::InvalidMessage(format!(
                    "part {i} is an empty text part"
                )));
            }
            MessagePart::File {
                media_type, url, ..
            } if media_type.is_empty() || url.is_empty() => {
                return Err(TetherError::InvalidMessage(format!(
                    "part {i} is a file part without media type or url"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// An initial message parked in the coordination store until the session
/// that will consume it has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Ordered content parts.
    pub parts: Vec<MessagePart>,
    /// Template the new session is created from.
    #[serde(rename = "templateId")]
    pub template_id: String,
    /// Unix timestamp in milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl PendingMessage {
    /// Creates a pending message stamped with the current time.
    pub fn new(parts: Vec<MessagePart>, template_id: impl Into<String>) -> Self {
        Self {
            parts,
            template_id: template_id.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Converts the parked parts into a user message.
    pub fn into_message(self) -> Message {
        Message::new(Role::User, self.parts)
    }
}
