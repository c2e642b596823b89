// Typed errors with thiserror. Surface meaningful messages to JS.
// Sample processing never fails; errors only come from config, layout, and host calls.

use thiserror::Error;

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid layout snapshot: {0}")]
    InvalidLayout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Host call `{method}` failed: {message}")]
    HostCall { method: String, message: String },
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
