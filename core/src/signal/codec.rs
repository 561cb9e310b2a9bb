// Envelope codec: JSON text frames with a size limit

use super::types::{Envelope, ProtocolError};

/// Maximum encoded envelope size: 256 KB.
/// An SDP blob with many candidates stays well below this.
pub const MAX_ENVELOPE_SIZE: usize = 256 * 1024;

/// Serialize an envelope to a JSON text frame
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(envelope)
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;

    if text.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge {
            size: text.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }

    Ok(text)
}

/// Parse a text or binary frame into an envelope
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    if bytes.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::TooLarge {
            size: bytes.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }

    serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))
}

/// Read only the `type` tag of a frame, for logging.
///
/// The relay never acts on this; unknown or missing tags yield `None`.
pub fn peek_kind(bytes: &[u8]) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct Tag {
        #[serde(rename = "type")]
        kind: String,
    }

    serde_json::from_slice::<Tag>(bytes).ok().map(|t| t.kind)
}
