// Outbound side of the signalling path

use super::types::Envelope;

/// Anything that can carry an envelope towards the other peer.
///
/// Delivery is best effort: implementations log and drop when they cannot
/// send. Peers recover by offering again.
pub trait SignalSink: Send + Sync {
    fn send(&self, envelope: Envelope);
}
