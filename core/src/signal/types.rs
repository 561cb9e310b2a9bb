// Signalling types: the envelope carried by the relay and the typed payloads
// the peers decode from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Envelope kind tag. Wire names match the browser client exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    #[serde(rename = "offer")]
    Offer,
    #[serde(rename = "answer")]
    Answer,
    #[serde(rename = "ice-candidate")]
    IceCandidate,
    #[serde(rename = "closeVideoCall")]
    CloseVideoCall,
}

impl EnvelopeKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Offer => "offer",
            EnvelopeKind::Answer => "answer",
            EnvelopeKind::IceCandidate => "ice-candidate",
            EnvelopeKind::CloseVideoCall => "closeVideoCall",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit exchanged over the relay: `{"type": ..., "data": ...}`.
///
/// `data` is kept as raw JSON. Only the negotiation state machine gives it a
/// shape, via [`Signal::from_envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, data: Value) -> Self {
        Self { kind, data }
    }
}

/// SDP type as reported by the native channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description blob (`RTCSessionDescriptionInit` shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate (`RTCIceCandidateInit` shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// Typed view of an [`Envelope`]
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    CloseVideoCall,
}

/// Signal decoding errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: EnvelopeKind, reason: String },
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
    #[error("Envelope too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Signal {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Signal::Offer(_) => EnvelopeKind::Offer,
            Signal::Answer(_) => EnvelopeKind::Answer,
            Signal::IceCandidate(_) => EnvelopeKind::IceCandidate,
            Signal::CloseVideoCall => EnvelopeKind::CloseVideoCall,
        }
    }

    /// Give the envelope payload its kind-specific shape
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let malformed = |e: serde_json::Error| ProtocolError::MalformedPayload {
            kind: envelope.kind,
            reason: e.to_string(),
        };

        match envelope.kind {
            EnvelopeKind::Offer => serde_json::from_value(envelope.data.clone())
                .map(Signal::Offer)
                .map_err(malformed),
            EnvelopeKind::Answer => serde_json::from_value(envelope.data.clone())
                .map(Signal::Answer)
                .map_err(malformed),
            EnvelopeKind::IceCandidate => serde_json::from_value(envelope.data.clone())
                .map(Signal::IceCandidate)
                .map_err(malformed),
            // Payload is ignored; older clients send "" here.
            EnvelopeKind::CloseVideoCall => Ok(Signal::CloseVideoCall),
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind();
        let data = match self {
            Signal::Offer(desc) | Signal::Answer(desc) => {
                serde_json::to_value(desc).unwrap_or(Value::Null)
            }
            Signal::IceCandidate(candidate) => {
                serde_json::to_value(candidate).unwrap_or(Value::Null)
            }
            Signal::CloseVideoCall => Value::String(String::new()),
        };
        Envelope::new(kind, data)
    }
}

impl From<Signal> for Envelope {
    fn from(signal: Signal) -> Self {
        signal.into_envelope()
    }
}

impl TryFrom<&Envelope> for Signal {
    type Error = ProtocolError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        Signal::from_envelope(envelope)
    }
}
