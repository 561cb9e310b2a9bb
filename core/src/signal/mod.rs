// Signal module: wire envelope shared by the relay and the peers

pub mod codec;
pub mod sink;
pub mod types;

pub use codec::{decode_envelope, encode_envelope, peek_kind, MAX_ENVELOPE_SIZE};
pub use sink::SignalSink;
pub use types::{
    Envelope, EnvelopeKind, IceCandidate, ProtocolError, SdpType, SessionDescription, Signal,
};
