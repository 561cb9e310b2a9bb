// Native channel seam
//
// The real media transport (ICE, DTLS, RTP) lives behind `PeerChannel`. Its
// callbacks come back as `ChannelEvent`s on the session queue, tagged with
// the generation of the channel that raised them.

use super::media::{MediaConstraints, MediaStream, TrackKind};
use super::session::CallInput;
use crate::signal::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Offer options handed to `create_offer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
    pub ice_restart: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            offer_to_receive_audio: true,
            offer_to_receive_video: true,
            ice_restart: false,
        }
    }
}

/// Per-call settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<IceServer>,
    pub media: MediaConstraints,
    pub offer: OfferOptions,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun("stun:stun.kundenserver.de:3478")],
            media: MediaConstraints::default(),
            offer: OfferOptions::default(),
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    /// States that end the session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Failed
                | IceConnectionState::Disconnected
                | IceConnectionState::Closed
        )
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Media arriving from the other peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A gathered local candidate; `None` marks the end of gathering
    LocalCandidate(Option<IceCandidate>),
    ConnectivityChanged(IceConnectionState),
    SignalingChanged(SignalingState),
    RemoteTrack(RemoteTrack),
}

/// Sink a channel reports its events into.
///
/// Events are queued behind whatever the session is doing and dropped once
/// the channel that raised them is no longer the current one.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    generation: u64,
    queue: mpsc::UnboundedSender<CallInput>,
}

impl ChannelEvents {
    pub(crate) fn new(generation: u64, queue: mpsc::UnboundedSender<CallInput>) -> Self {
        Self { generation, queue }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: ChannelEvent) {
        // The session task is gone; nobody is left to care
        let _ = self.queue.send(CallInput::Channel {
            generation: self.generation,
            event,
        });
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("Rejected by channel: {0}")]
    Rejected(String),
    #[error("Channel is closed")]
    Closed,
    #[error("Channel failure: {0}")]
    Failed(String),
}

/// The native peer connection
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Attach every track of the local stream
    async fn add_tracks(&self, stream: &MediaStream) -> Result<(), ChannelError>;

    async fn create_offer(
        &self,
        options: &OfferOptions,
    ) -> Result<SessionDescription, ChannelError>;

    async fn create_answer(&self) -> Result<SessionDescription, ChannelError>;

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ChannelError>;

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ChannelError>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), ChannelError>;

    /// Stop all transceivers and release the connection
    async fn close(&self);
}

/// Builds one native channel per session
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn create(
        &self,
        config: &CallConfig,
        events: ChannelEvents,
    ) -> Result<Arc<dyn PeerChannel>, ChannelError>;
}
