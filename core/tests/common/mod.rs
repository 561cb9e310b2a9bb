//! Shared fakes for the integration tests: a local relay, an in-memory
//! native channel and a capture device that always works.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use peercall_core::call::{
    CallConfig, ChannelError, ChannelEvents, ChannelFactory, MediaConstraints, MediaError,
    MediaSource, MediaStream, MediaTrack, OfferOptions, PeerChannel, TrackKind,
};
use peercall_core::relay::{ConnectionRegistry, RelayConfig, RelayServer};
use peercall_core::signal::{Envelope, IceCandidate, SessionDescription, SignalSink};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Start a relay on an ephemeral localhost port
pub async fn start_relay() -> (SocketAddr, Arc<ConnectionRegistry>) {
    let config = RelayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
    };
    let server = RelayServer::bind(&config).await.expect("bind relay");
    let addr = server.local_addr();
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

pub async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

pub struct FixedMedia;

#[async_trait]
impl MediaSource for FixedMedia {
    async fn local_stream(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        Ok(MediaStream::new(
            "local",
            vec![
                MediaTrack {
                    id: "mic".into(),
                    kind: TrackKind::Audio,
                },
                MediaTrack {
                    id: "cam".into(),
                    kind: TrackKind::Video,
                },
            ],
        ))
    }

    fn set_tracks_enabled(&self, _enabled: bool) {}
}

/// Records what the negotiation did to it
#[derive(Default)]
pub struct LoopbackChannel {
    pub name: String,
    offers: AtomicUsize,
    pub remote: Mutex<Vec<SessionDescription>>,
    pub local: Mutex<Vec<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub closed: AtomicUsize,
}

impl LoopbackChannel {
    pub fn applied_candidates(&self) -> Vec<String> {
        self.candidates.lock().iter().map(|c| c.candidate.clone()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl PeerChannel for LoopbackChannel {
    async fn add_tracks(&self, _stream: &MediaStream) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn create_offer(
        &self,
        _options: &OfferOptions,
    ) -> Result<SessionDescription, ChannelError> {
        let n = self.offers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("{}-offer-{}", self.name, n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, ChannelError> {
        Ok(SessionDescription::answer(format!("{}-answer", self.name)))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ChannelError> {
        self.local.lock().push(description.clone());
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ChannelError> {
        self.remote.lock().push(description.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), ChannelError> {
        if self.remote.lock().is_empty() {
            return Err(ChannelError::Rejected("no remote description".into()));
        }
        self.candidates.lock().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct LoopbackFactory {
    name: String,
    pub channels: Mutex<Vec<(Arc<LoopbackChannel>, ChannelEvents)>>,
}

impl LoopbackFactory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn last(&self) -> Option<(Arc<LoopbackChannel>, ChannelEvents)> {
        self.channels.lock().last().cloned()
    }
}

#[async_trait]
impl ChannelFactory for LoopbackFactory {
    async fn create(
        &self,
        _config: &CallConfig,
        events: ChannelEvents,
    ) -> Result<Arc<dyn PeerChannel>, ChannelError> {
        let channel = Arc::new(LoopbackChannel {
            name: self.name.clone(),
            ..Default::default()
        });
        self.channels.lock().push((Arc::clone(&channel), events));
        Ok(channel)
    }
}

/// Signal sink that only records
#[derive(Default)]
pub struct Recorder {
    pub sent: Mutex<Vec<Envelope>>,
}

impl SignalSink for Recorder {
    fn send(&self, envelope: Envelope) {
        self.sent.lock().push(envelope);
    }
}
