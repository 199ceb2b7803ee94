pub mod audio;
pub mod composer;
pub mod deletion;
pub mod integration;
pub mod messages;
pub mod names;
pub mod playback;
pub mod session;
pub mod stream;
pub mod upload;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedbackError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Capture engine failure: {0}")]
    CaptureEngineFailure(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("No signed-in user")]
    NotSignedIn,

    #[error("Recorder busy: {0}")]
    RecorderBusy(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Not authorized to modify message {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FeedbackError {
    fn from(e: std::io::Error) -> Self {
        FeedbackError::Io(e.to_string())
    }
}

impl FeedbackError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Needs a settings change outside the app
            FeedbackError::PermissionDenied => false,
            FeedbackError::TransportUnavailable(_) => true,
            FeedbackError::CaptureEngineFailure(_) => true,
            FeedbackError::SendFailed(_) => true,
            FeedbackError::NotSignedIn => false,
            FeedbackError::RecorderBusy(_) => true,
            FeedbackError::InvalidMessage(_) => false,
            FeedbackError::Unauthorized(_) => false,
            FeedbackError::Config(_) => false,
            FeedbackError::Io(_) => false,
        }
    }

    /// Blocking failures must be dismissed by the user; the rest are only logged
    pub fn requires_acknowledgement(&self) -> bool {
        matches!(
            self,
            FeedbackError::PermissionDenied
                | FeedbackError::SendFailed(_)
                | FeedbackError::Unauthorized(_)
        )
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            FeedbackError::PermissionDenied => {
                "Microphone access was refused. Enable it in the system settings to record voice notes."
                    .to_string()
            }
            FeedbackError::TransportUnavailable(_) => {
                "Connection problem. Please try again.".to_string()
            }
            FeedbackError::CaptureEngineFailure(_) => {
                "Audio device error. Please try again.".to_string()
            }
            FeedbackError::SendFailed(_) => {
                "The message could not be sent. Please try again.".to_string()
            }
            FeedbackError::NotSignedIn => "Sign in to send feedback.".to_string(),
            FeedbackError::RecorderBusy(_) => {
                "A recording or upload is already in progress.".to_string()
            }
            FeedbackError::InvalidMessage(_) => "This message is not valid.".to_string(),
            FeedbackError::Unauthorized(_) => {
                "Only the author can delete this message.".to_string()
            }
            FeedbackError::Config(_) => "Configuration error. Please check settings.".to_string(),
            FeedbackError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
