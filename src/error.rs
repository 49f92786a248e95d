//! Error types for the coaching runtime.

/// Top-level error type for fitcoach.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    /// Camera / frame source error.
    #[error("camera error: {0}")]
    Camera(String),

    /// Model asset fetch or parse error.
    #[error("asset error: {0}")]
    Asset(String),

    /// Remote image evaluation error.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Remote trainer chat error.
    #[error("chat error: {0}")]
    Chat(String),

    /// Speech synthesis error.
    #[error("speech error: {0}")]
    Speech(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Trainer catalog error (parse, validation, unknown trainer).
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Application shell state error (invalid transition, no session).
    #[error("session error: {0}")]
    Session(String),

    /// Static site server error.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CoachError>;
