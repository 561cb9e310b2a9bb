//! Peer-side call negotiation
//!
//! The native media stack is reached only through [`MediaSource`],
//! [`ChannelFactory`] / [`PeerChannel`] and [`crate::signal::SignalSink`].

pub mod actor;
pub mod channel;
pub mod error;
pub mod media;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use actor::CallHandle;
pub use channel::{
    CallConfig, ChannelError, ChannelEvent, ChannelEvents, ChannelFactory, IceConnectionState,
    IceServer, OfferOptions, PeerChannel, RemoteTrack, SignalingState,
};
pub use error::CallError;
pub use media::{
    MediaConstraints, MediaError, MediaSource, MediaStream, MediaTrack, TrackKind,
    VideoConstraints,
};
pub use session::{CallEvent, CallInput, CallState, Negotiator, Session};
