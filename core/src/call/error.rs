use super::channel::{ChannelError, IceConnectionState};
use super::media::MediaError;
use thiserror::Error;

/// Errors surfaced by a call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("No camera or microphone available")]
    MediaUnavailable,
    #[error("Permission to use camera and microphone was denied")]
    MediaPermissionDenied,
    #[error("Media error: {0}")]
    MediaFailure(String),
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("Connectivity lost ({0})")]
    ConnectivityLost(IceConnectionState),
}

impl CallError {
    /// Whether the session must be torn down after reporting this error.
    /// Permission denial before a session exists only reports.
    pub fn forces_teardown(&self) -> bool {
        !matches!(self, CallError::MediaPermissionDenied)
    }
}

impl From<MediaError> for CallError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::NotFound => CallError::MediaUnavailable,
            MediaError::PermissionDenied => CallError::MediaPermissionDenied,
            MediaError::Other(reason) => CallError::MediaFailure(reason),
        }
    }
}

impl From<ChannelError> for CallError {
    fn from(e: ChannelError) -> Self {
        CallError::NegotiationFailed(e.to_string())
    }
}
