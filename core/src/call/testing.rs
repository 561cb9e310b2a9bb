// In-memory channel, factory and signal sink for negotiation tests

use super::channel::{
    CallConfig, ChannelError, ChannelEvents, ChannelFactory, OfferOptions, PeerChannel,
};
use super::media::{MediaStream, MediaTrack, TrackKind};
use crate::signal::{Envelope, EnvelopeKind, IceCandidate, SessionDescription, SignalSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub fn stream() -> MediaStream {
    MediaStream::new(
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
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    AddTracks(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(String),
    SetRemote(String),
    AddCandidate(String),
}

#[derive(Default)]
pub struct FakeChannel {
    ops: Mutex<Vec<ChannelOp>>,
    offers: AtomicUsize,
    answers: AtomicUsize,
    closes: AtomicUsize,
    reject_remote: AtomicBool,
    reject_candidates: AtomicBool,
    gate: Option<Arc<Notify>>,
    parked: AtomicUsize,
}

impl FakeChannel {
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.ops.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reject_candidates(&self) {
        self.reject_candidates.store(true, Ordering::SeqCst);
    }

    /// Number of calls that have reached the gate
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            self.parked.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        }
    }

    fn record(&self, op: ChannelOp) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.ops.lock().push(op);
        Ok(())
    }
}

#[async_trait]
impl PeerChannel for FakeChannel {
    async fn add_tracks(&self, stream: &MediaStream) -> Result<(), ChannelError> {
        self.record(ChannelOp::AddTracks(stream.id.clone()))
    }

    async fn create_offer(
        &self,
        _options: &OfferOptions,
    ) -> Result<SessionDescription, ChannelError> {
        self.pass_gate().await;
        self.record(ChannelOp::CreateOffer)?;
        let n = self.offers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("offer-{}", n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, ChannelError> {
        self.record(ChannelOp::CreateAnswer)?;
        let n = self.answers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::answer(format!("answer-{}", n)))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ChannelError> {
        self.record(ChannelOp::SetLocal(description.sdp.clone()))
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ChannelError> {
        self.pass_gate().await;
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected("unparseable sdp".into()));
        }
        self.record(ChannelOp::SetRemote(description.sdp.clone()))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), ChannelError> {
        if self.reject_candidates.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected("bad candidate".into()));
        }
        self.record(ChannelOp::AddCandidate(candidate.candidate.clone()))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeFactory {
    channels: Mutex<Vec<(Arc<FakeChannel>, ChannelEvents)>>,
    reject_remote: bool,
    gate: Option<Arc<Notify>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels that refuse every remote description
    pub fn rejecting_remote() -> Self {
        Self {
            reject_remote: true,
            ..Self::default()
        }
    }

    /// Channels whose `create_offer` and `set_remote_description` wait for
    /// a permit from `gate`
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn last(&self) -> Option<Arc<FakeChannel>> {
        self.channels.lock().last().map(|(c, _)| Arc::clone(c))
    }

    /// Event sink handed to the `n`th channel
    pub fn events(&self, n: usize) -> Option<ChannelEvents> {
        self.channels.lock().get(n).map(|(_, e)| e.clone())
    }
}

#[async_trait]
impl ChannelFactory for FakeFactory {
    async fn create(
        &self,
        _config: &CallConfig,
        events: ChannelEvents,
    ) -> Result<Arc<dyn PeerChannel>, ChannelError> {
        let channel = Arc::new(FakeChannel {
            gate: self.gate.clone(),
            ..FakeChannel::default()
        });
        channel
            .reject_remote
            .store(self.reject_remote, Ordering::SeqCst);
        self.channels.lock().push((Arc::clone(&channel), events));
        Ok(channel)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<EnvelopeKind> {
        self.sent.lock().iter().map(|e| e.kind).collect()
    }

    pub fn last(&self) -> Option<Envelope> {
        self.sent.lock().last().cloned()
    }
}

impl SignalSink for RecordingSink {
    fn send(&self, envelope: Envelope) {
        self.sent.lock().push(envelope);
    }
}
