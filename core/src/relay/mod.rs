//! Signalling relay
//!
//! A single broadcast domain: every frame a client sends is delivered to all
//! other connected clients, untouched. No rooms, no pairing, no auth.

pub mod config;
pub mod registry;
pub mod server;

pub use config::{ConfigError, RelayConfig, TlsConfig};
pub use registry::{
    BroadcastReport, ConnectionId, ConnectionRegistry, ConnectionState, Registration,
    RegistryStats,
};
pub use server::{RelayError, RelayServer};
