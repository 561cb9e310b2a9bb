//! Negotiation state machine
//!
//! One `Negotiator` owns the single session of a peer. Every input (user
//! action, inbound envelope, native channel event) goes through
//! [`Negotiator::handle`], one at a time. Each native channel step is awaited
//! before the next input is looked at, so a hang-up that arrives mid-step is
//! applied right after it.

use super::channel::{
    CallConfig, ChannelEvent, ChannelEvents, ChannelFactory, IceConnectionState, PeerChannel,
    RemoteTrack, SignalingState,
};
use super::error::CallError;
use super::media::{MediaSource, MediaStream};
use crate::signal::{Envelope, IceCandidate, SessionDescription, Signal, SignalSink};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the call event channel
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Idle,
    Offering,
    Stable,
    Renegotiating,
    Closing,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Offering => "offering",
            CallState::Stable => "stable",
            CallState::Renegotiating => "renegotiating",
            CallState::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Everything the session queue carries
#[derive(Debug, Clone)]
pub enum CallInput {
    Dial,
    HangUp,
    Signal(Envelope),
    Channel { generation: u64, event: ChannelEvent },
}

/// What observers of a call get to see
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    StateChanged { from: CallState, to: CallState },
    RemoteTrack(RemoteTrack),
    ConnectivityChanged(IceConnectionState),
    Error(CallError),
}

/// Negotiation state of the current call
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub state: CallState,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    /// Remote candidates waiting for a remote description, in arrival order
    pub pending_candidates: VecDeque<IceCandidate>,
    pub has_local_media: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            state: CallState::Idle,
            local_description: None,
            remote_description: None,
            pending_candidates: VecDeque::new(),
            has_local_media: false,
        }
    }

    fn reset(&mut self) {
        self.local_description = None;
        self.remote_description = None;
        self.pending_candidates.clear();
        self.has_local_media = false;
    }
}

pub struct Negotiator {
    config: CallConfig,
    media: Arc<dyn MediaSource>,
    factory: Arc<dyn ChannelFactory>,
    signal: Arc<dyn SignalSink>,
    /// Cloned into every channel's event sink
    queue: mpsc::UnboundedSender<CallInput>,
    session: Session,
    channel: Option<Arc<dyn PeerChannel>>,
    local_stream: Option<MediaStream>,
    generation: u64,
    state_tx: watch::Sender<CallState>,
    events: broadcast::Sender<CallEvent>,
}

impl Negotiator {
    /// `queue` must feed back into [`Negotiator::handle`]; channel events are
    /// posted there.
    pub fn new(
        config: CallConfig,
        media: Arc<dyn MediaSource>,
        factory: Arc<dyn ChannelFactory>,
        signal: Arc<dyn SignalSink>,
        queue: mpsc::UnboundedSender<CallInput>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CallState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            media,
            factory,
            signal,
            queue,
            session: Session::new(),
            channel: None,
            local_stream: None,
            generation: 0,
            state_tx,
            events,
        }
    }

    pub fn state(&self) -> CallState {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Generation of the current (or last) native channel
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<CallEvent> {
        self.events.clone()
    }

    /// Process one input to completion
    pub async fn handle(&mut self, input: CallInput) {
        match input {
            CallInput::Dial => self.on_dial().await,
            CallInput::HangUp => self.on_hang_up().await,
            CallInput::Signal(envelope) => self.on_envelope(envelope).await,
            CallInput::Channel { generation, event } => {
                if generation != self.generation || self.channel.is_none() {
                    debug!("Dropping event from stale channel #{}: {:?}", generation, event);
                    return;
                }
                self.on_channel_event(event).await;
            }
        }
    }

    // ========================================================================
    // USER ACTIONS
    // ========================================================================

    async fn on_dial(&mut self) {
        match self.session.state {
            CallState::Idle => {
                // Anything buffered before our own offer belongs to a finished call
                let stale = self.session.pending_candidates.len();
                if stale > 0 {
                    info!("Discarding {} candidate(s) left over from an earlier call", stale);
                    self.session.pending_candidates.clear();
                }
                if let Err(e) = self.open_session().await {
                    self.fail(e).await;
                    return;
                }
                self.transition(CallState::Offering);
                if let Err(e) = self.send_offer().await {
                    self.fail(e).await;
                }
            }
            CallState::Stable => {
                self.transition(CallState::Renegotiating);
                if let Err(e) = self.send_offer().await {
                    self.fail(e).await;
                }
            }
            state => debug!("Ignoring dial while {}", state),
        }
    }

    async fn on_hang_up(&mut self) {
        if self.session.state == CallState::Idle {
            debug!("Hang-up with no call in progress");
            return;
        }
        info!("Hanging up");
        self.signal.send(Signal::CloseVideoCall.into_envelope());
        self.teardown().await;
    }

    // ========================================================================
    // INBOUND SIGNALS
    // ========================================================================

    async fn on_envelope(&mut self, envelope: Envelope) {
        let signal = match Signal::from_envelope(&envelope) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Ignoring envelope: {}", e);
                return;
            }
        };
        debug!("Received {} while {}", signal.kind(), self.session.state);

        match signal {
            Signal::Offer(offer) => self.on_offer(offer).await,
            Signal::Answer(answer) => self.on_answer(answer).await,
            Signal::IceCandidate(candidate) => self.on_remote_candidate(candidate).await,
            Signal::CloseVideoCall => self.on_remote_close().await,
        }
    }

    async fn on_offer(&mut self, offer: SessionDescription) {
        match self.session.state {
            CallState::Idle => {
                if let Err(e) = self.open_session().await {
                    self.fail(e).await;
                    return;
                }
                match self.accept_offer(offer).await {
                    Ok(()) => self.transition(CallState::Stable),
                    Err(e) => self.fail(e).await,
                }
            }
            CallState::Stable => {
                self.transition(CallState::Renegotiating);
                match self.accept_offer(offer).await {
                    Ok(()) => self.transition(CallState::Stable),
                    Err(e) => self.fail(e).await,
                }
            }
            state => warn!("Ignoring offer while {}", state),
        }
    }

    async fn on_answer(&mut self, answer: SessionDescription) {
        match self.session.state {
            CallState::Offering | CallState::Renegotiating => {
                match self.accept_answer(answer).await {
                    Ok(()) => self.transition(CallState::Stable),
                    Err(e) => self.fail(e).await,
                }
            }
            state => warn!("Ignoring answer while {}", state),
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let channel = match (&self.session.remote_description, &self.channel) {
            (Some(_), Some(channel)) => Arc::clone(channel),
            _ => {
                debug!(
                    "Buffering candidate ({} pending)",
                    self.session.pending_candidates.len() + 1
                );
                self.session.pending_candidates.push_back(candidate);
                return;
            }
        };

        if let Err(e) = channel.add_ice_candidate(&candidate).await {
            self.fail(e.into()).await;
        }
    }

    async fn on_remote_close(&mut self) {
        if self.session.state == CallState::Idle {
            debug!("closeVideoCall with no call in progress");
            return;
        }
        info!("Remote peer closed the call");
        self.teardown().await;
    }

    // ========================================================================
    // CHANNEL EVENTS
    // ========================================================================

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::LocalCandidate(Some(candidate)) => match self.session.state {
                CallState::Idle | CallState::Closing => {
                    debug!("Dropping local candidate while {}", self.session.state)
                }
                _ => self.signal.send(Signal::IceCandidate(candidate).into_envelope()),
            },
            ChannelEvent::LocalCandidate(None) => info!("Candidate gathering complete"),
            ChannelEvent::ConnectivityChanged(ice) => {
                info!("ICE connection state: {}", ice);
                self.publish(CallEvent::ConnectivityChanged(ice));
                if ice.is_terminal() && self.session.state != CallState::Idle {
                    self.fail(CallError::ConnectivityLost(ice)).await;
                }
            }
            ChannelEvent::SignalingChanged(SignalingState::Closed) => {
                if self.session.state != CallState::Idle {
                    info!("Signalling state closed");
                    self.teardown().await;
                }
            }
            ChannelEvent::SignalingChanged(state) => debug!("Signalling state: {:?}", state),
            ChannelEvent::RemoteTrack(track) => {
                info!("Remote {:?} track {}", track.kind, track.id);
                self.publish(CallEvent::RemoteTrack(track));
            }
        }
    }

    // ========================================================================
    // NEGOTIATION STEPS
    // ========================================================================

    /// Local media plus a fresh channel carrying it
    async fn open_session(&mut self) -> Result<(), CallError> {
        let stream = self.ensure_local_media().await?;

        self.generation += 1;
        let events = ChannelEvents::new(self.generation, self.queue.clone());
        let channel = self.factory.create(&self.config, events).await?;
        self.channel = Some(Arc::clone(&channel));
        debug!("Opened channel #{}", self.generation);

        channel.add_tracks(&stream).await?;
        Ok(())
    }

    async fn ensure_local_media(&mut self) -> Result<MediaStream, CallError> {
        if let Some(stream) = &self.local_stream {
            return Ok(stream.clone());
        }

        let stream = self.media.local_stream(&self.config.media).await?;
        self.media.set_tracks_enabled(true);
        self.session.has_local_media = true;
        self.local_stream = Some(stream.clone());
        Ok(stream)
    }

    async fn send_offer(&mut self) -> Result<(), CallError> {
        let channel = self.current_channel()?;
        let offer = channel.create_offer(&self.config.offer).await?;
        channel.set_local_description(&offer).await?;
        self.session.local_description = Some(offer.clone());
        self.signal.send(Signal::Offer(offer).into_envelope());
        Ok(())
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<(), CallError> {
        let channel = self.current_channel()?;
        channel.set_remote_description(&offer).await?;
        self.session.remote_description = Some(offer);
        self.flush_pending(&channel).await?;

        let answer = channel.create_answer().await?;
        channel.set_local_description(&answer).await?;
        self.session.local_description = Some(answer.clone());
        self.signal.send(Signal::Answer(answer).into_envelope());
        Ok(())
    }

    async fn accept_answer(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        let channel = self.current_channel()?;
        channel.set_remote_description(&answer).await?;
        self.session.remote_description = Some(answer);
        self.flush_pending(&channel).await
    }

    async fn flush_pending(&mut self, channel: &Arc<dyn PeerChannel>) -> Result<(), CallError> {
        if !self.session.pending_candidates.is_empty() {
            debug!(
                "Applying {} buffered candidate(s)",
                self.session.pending_candidates.len()
            );
        }
        while let Some(candidate) = self.session.pending_candidates.pop_front() {
            channel.add_ice_candidate(&candidate).await?;
        }
        Ok(())
    }

    fn current_channel(&self) -> Result<Arc<dyn PeerChannel>, CallError> {
        self.channel
            .clone()
            .ok_or_else(|| CallError::NegotiationFailed("no channel".to_string()))
    }

    // ========================================================================
    // TEARDOWN
    // ========================================================================

    /// Report an error and tear the session down when the error demands it
    async fn fail(&mut self, error: CallError) {
        error!("Call error while {}: {}", self.session.state, error);
        self.publish(CallEvent::Error(error.clone()));

        if error.forces_teardown() || self.session.state != CallState::Idle {
            self.teardown().await;
        }
    }

    /// Close the channel, release local media and go back to idle.
    ///
    /// Does nothing when idle with nothing held.
    pub async fn teardown(&mut self) {
        let active = self.session.state != CallState::Idle;
        if !active && self.channel.is_none() && self.local_stream.is_none() {
            return;
        }

        if active {
            self.transition(CallState::Closing);
        }
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        if self.local_stream.take().is_some() {
            self.media.set_tracks_enabled(false);
        }
        self.session.reset();
        if active {
            self.transition(CallState::Idle);
        }
    }

    fn transition(&mut self, to: CallState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        info!("Call state {} -> {}", from, to);
        self.session.state = to;
        self.state_tx.send_replace(to);
        self.publish(CallEvent::StateChanged { from, to });
    }

    fn publish(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
