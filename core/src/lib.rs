// peercall core: signalling for two-party audio/video calls
//
// A relay that fans every frame out to the other connected clients, and the
// per-peer pieces that talk to it: a reconnecting socket client and the
// offer/answer state machine.

pub mod call;
pub mod client;
pub mod relay;
pub mod signal;

pub use call::{CallConfig, CallError, CallEvent, CallHandle, CallState};
pub use client::{ReconnectPolicy, SocketClient, SocketClientConfig, SocketState};
pub use relay::{ConnectionRegistry, RelayConfig, RelayServer};
pub use signal::{Envelope, EnvelopeKind, Signal, SignalSink};
