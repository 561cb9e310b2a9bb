// Local media: the capture device seen through a narrow trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// A captured local stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

/// What to capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    /// `None` = audio only
    pub video: Option<VideoConstraints>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                width: 720,
                height: 540,
            }),
        }
    }
}

/// Capture errors, split the way the user needs to hear about them
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("No camera or microphone found")]
    NotFound,
    #[error("Permission to use camera and microphone was denied")]
    PermissionDenied,
    #[error("Error opening camera and/or microphone: {0}")]
    Other(String),
}

/// Local capture device
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open (or reuse) the local stream
    async fn local_stream(&self, constraints: &MediaConstraints) -> Result<MediaStream, MediaError>;

    /// Start or pause the local tracks
    fn set_tracks_enabled(&self, enabled: bool);
}
