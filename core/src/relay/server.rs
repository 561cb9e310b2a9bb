//! Relay Server: accepts WebSocket clients and fans every frame out to the others

use super::config::{RelayConfig, TlsConfig};
use super::registry::{ConnectionId, ConnectionRegistry};
use crate::signal::peek_kind;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_native_tls::TlsAcceptor;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Back-off after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Relay server error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The signalling relay
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    tls: Option<TlsAcceptor>,
}

impl RelayServer {
    /// Bind with a fresh registry
    pub async fn bind(config: &RelayConfig) -> Result<Self, RelayError> {
        Self::bind_with_registry(config, Arc::new(ConnectionRegistry::new())).await
    }

    /// Bind using a caller-supplied registry
    pub async fn bind_with_registry(
        config: &RelayConfig,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self, RelayError> {
        let tls = config.tls.as_ref().map(load_tls).transpose()?;

        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            registry,
            tls,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept clients forever
    pub async fn run(self) -> Result<(), RelayError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept clients until `shutdown` resolves.
    ///
    /// Connections that are already open keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            "Signalling relay started at {}://{}",
            if self.tls.is_some() { "wss" } else { "ws" },
            self.local_addr
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        "Signalling relay stopping, {} client(s) still open",
                        self.registry.len()
                    );
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
            }
        }

        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = Arc::clone(&self.registry);

        match self.tls.clone() {
            Some(acceptor) => {
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => serve_connection(tls_stream, addr, registry).await,
                        Err(e) => warn!("TLS handshake with {} failed: {}", addr, e),
                    }
                });
            }
            None => {
                tokio::spawn(serve_connection(stream, addr, registry));
            }
        }
    }
}

fn load_tls(tls: &TlsConfig) -> Result<TlsAcceptor, RelayError> {
    let cert = std::fs::read(&tls.cert_path)
        .map_err(|e| RelayError::Tls(format!("reading {}: {}", tls.cert_path.display(), e)))?;
    let key = std::fs::read(&tls.key_path)
        .map_err(|e| RelayError::Tls(format!("reading {}: {}", tls.key_path.display(), e)))?;

    let identity = native_tls::Identity::from_pkcs8(&cert, &key)
        .map_err(|e| RelayError::Tls(e.to_string()))?;
    let acceptor =
        native_tls::TlsAcceptor::new(identity).map_err(|e| RelayError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(acceptor))
}

/// Drive one client: upgrade, register, relay its frames, clean up.
///
/// Every failure here ends only this connection.
async fn serve_connection<S>(stream: S, addr: SocketAddr, registry: Arc<ConnectionRegistry>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut source) = ws.split();
    let registration = registry.register(addr);
    let id = registration.id;
    let mut outbound = registration.outbound;

    let writer_registry = Arc::clone(&registry);
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!("Write to {} failed: {}", id, e);
                writer_registry.unregister(id);
                return;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(frame @ (Message::Text(_) | Message::Binary(_)))) => {
                    relay_frame(&registry, id, frame);
                }
                Some(Ok(Message::Close(_))) => {
                    registry.mark_closing(id);
                    break;
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Client error on {}: {}", id, e);
                    break;
                }
                None => break,
            },
            _ = &mut writer => break,
        }
    }

    // Dropping the registry entry closes the writer queue, which closes the sink
    registry.unregister(id);
}

fn relay_frame(registry: &ConnectionRegistry, sender: ConnectionId, frame: Message) {
    let kind = match &frame {
        Message::Text(text) => peek_kind(text.as_bytes()),
        Message::Binary(bytes) => peek_kind(bytes),
        _ => None,
    };
    let len = frame.len();

    let report = registry.broadcast(sender, frame);
    debug!(
        "Relayed {} frame ({} bytes) from {} to {} client(s), {} failed",
        kind.as_deref().unwrap_or("untyped"),
        len,
        sender,
        report.delivered,
        report.failed
    );
}
