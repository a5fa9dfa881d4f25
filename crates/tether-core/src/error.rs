use crate::session::SessionId;

/// Top-level error type for the Tether workspace.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// The coordination store rejected or failed an operation.
    #[error("Coordination error: {0}")]
    Coordination(String),

    /// The stream entry disappeared between the existence check and the resume.
    #[error("Failed to resume existing stream for session {0}")]
    StreamResume(SessionId),

    /// The engine output does not expose a streamable response body.
    #[error("Missing stream capability: {0}")]
    MissingStreamCapability(String),

    /// Another generation currently holds the session claim.
    #[error("A generation is already running for session {0}")]
    GenerationInProgress(SessionId),

    /// An error raised by the generation engine.
    #[error("Engine error: {0}")]
    Engine(String),

    /// An error from the durable conversation store.
    #[error("Session store error: {0}")]
    Session(String),

    /// A message failed validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TetherError`].
pub type TetherResult<T> = Result<T, TetherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_session() {
        let err = TetherError::GenerationInProgress(SessionId::from("s-1"));
        assert_eq!(
            err.to_string(),
            "A generation is already running for session s-1"
        );
        let err = TetherError::StreamResume(SessionId::from("s-2"));
        assert!(err.to_string().contains("s-2"));
    }

    #[test]
    fn test_json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TetherError = parse.into();
        assert!(matches!(err, TetherError::Json(_)));
    }
}
