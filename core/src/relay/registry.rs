//! Connection Registry: tracks open client sockets and fans frames out to them

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque handle for one registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
}

/// A registered client connection
#[derive(Debug)]
struct Connection {
    address: SocketAddr,
    state: ConnectionState,
    opened_at: Instant,
    /// Writer queue; the connection's writer task owns the receiving end
    outbound: mpsc::UnboundedSender<Message>,
}

/// What `register` hands back to the connection task
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    /// Frames queued for this connection, in broadcast order
    pub outbound: mpsc::UnboundedReceiver<Message>,
}

/// Outcome of a single broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Registry statistics
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of registered connections
    pub connections_active: usize,
    /// Connections accepted since start
    pub connections_total: u64,
    /// Frames accepted for fan-out
    pub frames_relayed: u64,
    /// Payload bytes enqueued across all recipients
    pub bytes_relayed: u64,
}

/// Membership set of the relay.
///
/// Safe to share between connection tasks. `broadcast` works on a snapshot of
/// the members taken under the read lock, so a concurrent register or
/// unregister is either fully in or fully out of a given fan-out.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    stats: RwLock<RegistryStats>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            stats: RwLock::new(RegistryStats::default()),
        }
    }

    /// Register a newly accepted connection
    pub fn register(&self, address: SocketAddr) -> Registration {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self.connections.write();
        connections.insert(
            id,
            Connection {
                address,
                state: ConnectionState::Open,
                opened_at: Instant::now(),
                outbound: tx,
            },
        );

        let mut stats = self.stats.write();
        stats.connections_active = connections.len();
        stats.connections_total += 1;

        info!(
            "Client connected: {} from {}. Total connected clients: {}",
            id,
            address,
            connections.len()
        );

        Registration { id, outbound: rx }
    }

    /// Remove a connection. Returns false when it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write();
        let removed = connections.remove(&id);
        self.stats.write().connections_active = connections.len();

        match removed {
            Some(conn) => {
                info!(
                    "Client disconnected: {} ({}, open {:?}). Total connected clients: {}",
                    id,
                    conn.address,
                    conn.opened_at.elapsed(),
                    connections.len()
                );
                true
            }
            None => false,
        }
    }

    /// Stop broadcasting to a connection that has started its close handshake
    pub fn mark_closing(&self, id: ConnectionId) {
        if let Some(conn) = self.connections.write().get_mut(&id) {
            conn.state = ConnectionState::Closing;
        }
    }

    /// Queue `frame` for every open connection except `sender`.
    ///
    /// A recipient whose writer has gone away is unregistered; the rest still
    /// receive the frame.
    pub fn broadcast(&self, sender: ConnectionId, frame: Message) -> BroadcastReport {
        let recipients: Vec<(ConnectionId, mpsc::UnboundedSender<Message>)> = self
            .connections
            .read()
            .iter()
            .filter(|(id, conn)| **id != sender && conn.state == ConnectionState::Open)
            .map(|(id, conn)| (*id, conn.outbound.clone()))
            .collect();

        let frame_len = frame.len();
        let mut report = BroadcastReport::default();

        for (id, tx) in recipients {
            if tx.send(frame.clone()).is_ok() {
                report.delivered += 1;
            } else {
                debug!("Recipient {} writer is gone, dropping it", id);
                report.failed += 1;
                self.unregister(id);
            }
        }

        let mut stats = self.stats.write();
        stats.frames_relayed += 1;
        stats.bytes_relayed += (frame_len * report.delivered) as u64;

        report
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn state_of(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.read().get(&id).map(|c| c.state)
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats.read().clone()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
