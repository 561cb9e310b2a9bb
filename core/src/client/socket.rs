//! Socket Client: the peer's connection to the signalling relay

use super::reconnect::ReconnectPolicy;
use crate::signal::{decode_envelope, encode_envelope, Envelope, SignalSink};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket client configuration
#[derive(Debug, Clone)]
pub struct SocketClientConfig {
    /// Relay URL (`ws://` or `wss://`)
    pub url: String,
    /// What to do after an unexpected close
    pub reconnect: ReconnectPolicy,
    /// Inbound buffer per subscriber
    pub inbound_capacity: usize,
}

impl SocketClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            inbound_capacity: 256,
        }
    }
}

/// Connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed,
}

/// Socket client error types
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },
}

/// Handle to the relay connection. Clones share the same connection.
#[derive(Clone)]
pub struct SocketClient {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: broadcast::Sender<Envelope>,
    state: watch::Receiver<SocketState>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SocketClient {
    /// Open the relay connection and start the connection task
    pub async fn connect(config: SocketClientConfig) -> Result<Self, SocketError> {
        let (state_tx, state_rx) = watch::channel(SocketState::Connecting);

        let ws = dial(&config.url).await?;
        info!("Socket connected to {}", config.url);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, _) = broadcast::channel(config.inbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        state_tx.send_replace(SocketState::Open);
        tokio::spawn(connection_task(
            ws,
            config,
            outbound_rx,
            inbound_tx.clone(),
            state_tx,
            shutdown_rx,
        ));

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_tx,
            state: state_rx,
            shutdown: Arc::new(shutdown_tx),
        })
    }

    /// Queue an envelope for the relay; dropped with a warning unless open
    pub fn send(&self, envelope: Envelope) {
        let state = self.state();
        if state != SocketState::Open {
            warn!("Dropping {} envelope, socket is {:?}", envelope.kind, state);
            return;
        }

        match encode_envelope(&envelope) {
            Ok(text) => {
                debug!("Sending message: {}", envelope.kind);
                if self.outbound.send(Message::Text(text)).is_err() {
                    warn!("Dropping {} envelope, connection task ended", envelope.kind);
                }
            }
            Err(e) => warn!("Dropping {} envelope: {}", envelope.kind, e),
        }
    }

    /// Inbound envelopes in arrival order
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }

    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SocketState> {
        self.state.clone()
    }

    /// Close the connection and stop reconnecting
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl SignalSink for SocketClient {
    fn send(&self, envelope: Envelope) {
        SocketClient::send(self, envelope);
    }
}

async fn dial(url: &str) -> Result<WsStream, SocketError> {
    connect_async(url)
        .await
        .map(|(ws, _response)| ws)
        .map_err(|e| SocketError::ConnectionFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

enum PumpEnd {
    Shutdown,
    Lost,
}

async fn connection_task(
    mut ws: WsStream,
    config: SocketClientConfig,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    inbound: broadcast::Sender<Envelope>,
    state: watch::Sender<SocketState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        state.send_replace(SocketState::Open);

        match pump(ws, &mut outbound, &inbound, &mut shutdown).await {
            PumpEnd::Shutdown => break,
            PumpEnd::Lost => info!("Socket connection to {} closed", config.url),
        }

        // Whatever was queued for the dead connection is stale now
        let mut dropped = 0usize;
        while outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Dropped {} queued envelope(s) on connection loss", dropped);
        }

        match reconnect(&config, &state, &mut shutdown).await {
            Some(next) => ws = next,
            None => break,
        }
    }

    state.send_replace(SocketState::Closed);
    debug!("Socket connection task terminated");
}

async fn pump(
    ws: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    inbound: &broadcast::Sender<Envelope>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sink.close().await;
                    return PumpEnd::Shutdown;
                }
            }
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        warn!("Socket write failed: {}", e);
                        return PumpEnd::Lost;
                    }
                }
                // Every client handle is gone
                None => {
                    let _ = sink.close().await;
                    return PumpEnd::Shutdown;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(text.as_bytes(), inbound),
                Some(Ok(Message::Binary(bytes))) => deliver(&bytes, inbound),
                Some(Ok(Message::Close(_))) | None => return PumpEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket read failed: {}", e);
                    return PumpEnd::Lost;
                }
            },
        }
    }
}

fn deliver(bytes: &[u8], inbound: &broadcast::Sender<Envelope>) {
    match decode_envelope(bytes) {
        Ok(envelope) => {
            debug!("Received message of type: {}", envelope.kind);
            // No subscribers is fine; the envelope is simply not wanted
            let _ = inbound.send(envelope);
        }
        Err(e) => warn!("Ignoring unreadable frame: {}", e),
    }
}

async fn reconnect(
    config: &SocketClientConfig,
    state: &watch::Sender<SocketState>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<WsStream> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let Some(delay) = config.reconnect.delay_for(attempt) else {
            warn!(
                "Giving up on {} after {} reconnect attempt(s)",
                config.url,
                attempt - 1
            );
            return None;
        };

        state.send_replace(SocketState::Reconnecting { attempt });
        debug!("Reconnect attempt {} in {:?}", attempt, delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return None;
                }
            }
        }

        match dial(&config.url).await {
            Ok(ws) => {
                info!("Socket reconnected to {} (attempt {})", config.url, attempt);
                return Some(ws);
            }
            Err(e) => warn!("{}", e),
        }
    }
}
