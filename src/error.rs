//! Error types for the check-in signal pipeline

use thiserror::Error;

/// Errors that can occur while acquiring resources or processing signals.
///
/// Missing faces and unready frames are not errors; they surface as
/// [`crate::types::SkipReason`] and only show up in session statistics.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Landmark model failed to load: {0}")]
    ModelLoadFailure(String),

    #[error("A session is already running")]
    SessionActive,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse frame record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Wellness score out of range: {0}")]
    InvalidScore(u8),
}

impl SignalError {
    /// Short status line shown next to the auto-detect toggle.
    pub fn status_message(&self) -> String {
        match self {
            SignalError::DeviceUnavailable(_) => "Camera unavailable".to_string(),
            SignalError::ModelLoadFailure(_) => "Face model failed to load".to_string(),
            other => other.to_string(),
        }
    }
}
