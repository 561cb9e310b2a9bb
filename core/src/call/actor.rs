// Call task: runs a Negotiator on its own queue

use super::channel::{CallConfig, ChannelFactory};
use super::media::MediaSource;
use super::session::{CallEvent, CallInput, CallState, Negotiator};
use crate::signal::{Envelope, SignalSink};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a running call task. Clones drive the same call.
///
/// The task ends, hanging up any active call, once [`CallHandle::shutdown`]
/// is called or the last handle is dropped.
#[derive(Clone)]
pub struct CallHandle {
    inputs: mpsc::UnboundedSender<CallInput>,
    state: watch::Receiver<CallState>,
    events: broadcast::Sender<CallEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl CallHandle {
    pub fn spawn(
        config: CallConfig,
        media: Arc<dyn MediaSource>,
        factory: Arc<dyn ChannelFactory>,
        signal: Arc<dyn SignalSink>,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let negotiator = Negotiator::new(config, media, factory, signal, inputs_tx.clone());
        let state = negotiator.watch_state();
        let events = negotiator.event_sender();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run(negotiator, inputs_rx, shutdown_rx));

        Self {
            inputs: inputs_tx,
            state,
            events,
            shutdown: Arc::new(shutdown_tx),
        }
    }

    /// Start a call, or renegotiate the current one
    pub fn dial(&self) {
        self.post(CallInput::Dial);
    }

    pub fn hang_up(&self) {
        self.post(CallInput::HangUp);
    }

    /// Hand an inbound envelope to the call
    pub fn deliver(&self, envelope: Envelope) {
        self.post(CallInput::Signal(envelope));
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Feed every envelope from `inbound` (typically
    /// `SocketClient::subscribe()`) into this call
    pub fn follow(&self, mut inbound: broadcast::Receiver<Envelope>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(envelope) => handle.deliver(envelope),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Call fell behind the socket, {} envelope(s) lost", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Inbound envelope stream ended");
        })
    }

    /// Hang up and stop the call task
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn post(&self, input: CallInput) {
        if self.inputs.send(input).is_err() {
            warn!("Call task has stopped, input dropped");
        }
    }
}

async fn run(
    mut negotiator: Negotiator,
    mut inputs: mpsc::UnboundedReceiver<CallInput>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            input = inputs.recv() => match input {
                Some(input) => negotiator.handle(input).await,
                None => break,
            },
        }
    }

    negotiator.handle(CallInput::HangUp).await;
    info!("Call task stopped");
}
