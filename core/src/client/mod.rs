//! Signalling client
//!
//! Keeps one peer connected to the relay. It does not know about calls;
//! reconnecting never restores negotiation state.

pub mod reconnect;
pub mod socket;

pub use reconnect::ReconnectPolicy;
pub use socket::{SocketClient, SocketClientConfig, SocketError, SocketState};
