//! Two peers negotiating a call through a live relay
//!
//! Run with: cargo test --test integration_call_flow

mod common;

use common::{start_relay, wait_for, FixedMedia, LoopbackFactory};
use peercall_core::call::{CallConfig, CallHandle, CallState, ChannelEvent, IceConnectionState};
use peercall_core::client::{SocketClient, SocketClientConfig};
use peercall_core::signal::IceCandidate;
use std::sync::Arc;
use std::time::Duration;

struct Peer {
    call: CallHandle,
    socket: SocketClient,
    factory: Arc<LoopbackFactory>,
}

async fn peer(name: &str, url: &str) -> Peer {
    let socket = SocketClient::connect(SocketClientConfig::new(url))
        .await
        .expect("connect to relay");
    let factory = Arc::new(LoopbackFactory::new(name));
    let call = CallHandle::spawn(
        CallConfig::default(),
        Arc::new(FixedMedia),
        factory.clone(),
        Arc::new(socket.clone()),
    );
    call.follow(socket.subscribe());
    Peer {
        call,
        socket,
        factory,
    }
}

async fn wait_state(call: &CallHandle, want: CallState) {
    let mut rx = call.watch_state();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *rx.borrow_and_update() != want {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {}", want));
}

async fn connected_pair() -> (Peer, Peer) {
    let (addr, registry) = start_relay().await;
    let url = format!("ws://{}", addr);
    let alice = peer("alice", &url).await;
    let bob = peer("bob", &url).await;
    wait_for(|| registry.len() == 2).await;
    (alice, bob)
}

#[tokio::test]
async fn test_offer_answer_through_relay() {
    let (alice, bob) = connected_pair().await;

    alice.call.dial();
    wait_state(&bob.call, CallState::Stable).await;
    wait_state(&alice.call, CallState::Stable).await;

    let (bob_channel, _) = bob.factory.last().unwrap();
    let (alice_channel, _) = alice.factory.last().unwrap();
    assert_eq!(bob_channel.remote.lock()[0].sdp, "alice-offer-1");
    assert_eq!(alice_channel.remote.lock()[0].sdp, "bob-answer");
}

#[tokio::test]
async fn test_candidates_cross_the_relay() {
    let (alice, bob) = connected_pair().await;

    alice.call.dial();
    wait_state(&alice.call, CallState::Stable).await;

    let (_, alice_events) = alice.factory.last().unwrap();
    alice_events.emit(ChannelEvent::LocalCandidate(Some(IceCandidate::new("candidate:a1"))));
    alice_events.emit(ChannelEvent::LocalCandidate(Some(IceCandidate::new("candidate:a2"))));
    alice_events.emit(ChannelEvent::LocalCandidate(None));

    let (bob_channel, _) = bob.factory.last().unwrap();
    wait_for(|| bob_channel.applied_candidates().len() == 2).await;
    assert_eq!(
        bob_channel.applied_candidates(),
        vec!["candidate:a1".to_string(), "candidate:a2".to_string()]
    );
}

#[tokio::test]
async fn test_hang_up_closes_both_sides() {
    let (alice, bob) = connected_pair().await;

    alice.call.dial();
    wait_state(&bob.call, CallState::Stable).await;
    wait_state(&alice.call, CallState::Stable).await;

    bob.call.hang_up();
    wait_state(&bob.call, CallState::Idle).await;
    wait_state(&alice.call, CallState::Idle).await;

    assert!(alice.factory.last().unwrap().0.is_closed());
    assert!(bob.factory.last().unwrap().0.is_closed());
}

#[tokio::test]
async fn test_connectivity_loss_ends_one_side() {
    let (alice, bob) = connected_pair().await;

    alice.call.dial();
    wait_state(&alice.call, CallState::Stable).await;
    wait_state(&bob.call, CallState::Stable).await;

    let (_, alice_events) = alice.factory.last().unwrap();
    alice_events.emit(ChannelEvent::ConnectivityChanged(IceConnectionState::Failed));
    wait_state(&alice.call, CallState::Idle).await;

    // Losing connectivity is local; the other side finds out on its own
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bob.call.state(), CallState::Stable);
}

#[tokio::test]
async fn test_call_again_after_hang_up() {
    let (alice, bob) = connected_pair().await;

    alice.call.dial();
    wait_state(&bob.call, CallState::Stable).await;
    alice.call.hang_up();
    wait_state(&bob.call, CallState::Idle).await;

    bob.call.dial();
    wait_state(&alice.call, CallState::Stable).await;
    wait_state(&bob.call, CallState::Stable).await;

    assert_eq!(alice.factory.channels.lock().len(), 2);
    assert_eq!(bob.factory.channels.lock().len(), 2);
    assert!(alice.socket.state() == peercall_core::client::SocketState::Open);
}
