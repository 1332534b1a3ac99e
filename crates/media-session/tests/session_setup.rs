//! Tests for the session setup sequence and teardown.
//!
//! Covers:
//! - Request order of a successful setup
//! - Fatal setup failures (negotiation, both transports, join)
//! - Degraded sessions with one transport
//! - Leave, cancellation and channel-close teardown

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use media_session::engine::EngineTransport;
use media_session::engine::Consumer;
use common::protocol::methods;
use common::types::{Direction, MediaKind, TrackSource};
use media_session::actors::{EndReason, SessionEvent, Visibility};
use media_session::errors::TransportFailure;
use media_session::transport::TransportState;
use media_session::SessionError;
use serde_json::json;
use session_test_utils::*;
use std::time::Duration;

// ============================================================================
// Setup sequence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_setup_request_order() {
    let session = SessionHarness::new().start().await.unwrap();

    assert_eq!(
        session.channel.request_methods(),
        vec![
            methods::GET_ROUTER_RTP_CAPABILITIES,
            methods::CREATE_PRODUCER_TRANSPORT,
            methods::CREATE_CONSUMER_TRANSPORT,
            methods::CONNECT_PRODUCER_TRANSPORT,
            methods::PRODUCE,
            methods::PRODUCE,
            methods::JOIN,
        ]
    );

    // Camera is published before the microphone.
    let produces = session.channel.requests_for(methods::PRODUCE);
    assert_eq!(produces[0]["kind"], json!("video"));
    assert_eq!(produces[1]["kind"], json!("audio"));

    let join = &session.channel.requests_for(methods::JOIN)[0];
    assert_eq!(join["displayName"], json!(TEST_DISPLAY_NAME));
    assert_eq!(join["roomId"], json!(TEST_ROOM_ID));
}

#[tokio::test(start_paused = true)]
async fn test_setup_state_after_join() {
    let session = SessionHarness::new().start().await.unwrap();
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.room_id, TEST_ROOM_ID);
    assert_eq!(state.local_peer_id.unwrap().as_str(), LOCAL_PEER_ID);
    assert_eq!(state.send_transport, Some(TransportState::Connected));
    // The receive transport connects on the first consume.
    assert_eq!(state.receive_transport, Some(TransportState::New));
    assert!(state.local_media.audio_enabled);
    assert!(state.local_media.video_enabled);
    assert!(state.local_media.audio_producer.is_some());
    assert!(state.local_media.video_producer.is_some());
    assert!(state.transport_failures.is_empty());
    assert!(state.peers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_negotiation_failure_aborts_setup() {
    let device = MockDevice::builder().fail_load().build();
    let result = SessionHarness::new().with_device(device).start().await;

    assert!(matches!(result, Err(SessionError::Negotiation(_))));
    assert!(result.as_ref().err().unwrap().is_setup_failure());
}

#[tokio::test(start_paused = true)]
async fn test_empty_router_capabilities_abort_setup() {
    let channel = MockChannel::builder()
        .respond(methods::GET_ROUTER_RTP_CAPABILITIES, json!({ "codecs": [] }))
        .build();
    let result = SessionHarness::new()
        .with_channel(channel.clone())
        .start()
        .await;

    assert!(matches!(result, Err(SessionError::Negotiation(_))));
    assert_eq!(
        channel.request_methods(),
        vec![methods::GET_ROUTER_RTP_CAPABILITIES]
    );
}

#[tokio::test(start_paused = true)]
async fn test_both_transports_failing_aborts_setup() {
    let device = MockDevice::builder()
        .fail_transport(Direction::Send)
        .fail_transport(Direction::Receive)
        .build();
    let channel = MockChannel::builder().build();
    let result = SessionHarness::new()
        .with_device(device)
        .with_channel(channel.clone())
        .start()
        .await;

    match result {
        Err(SessionError::Transport { send, receive }) => {
            assert_eq!(send.direction(), Direction::Send);
            assert_eq!(receive.direction(), Direction::Receive);
        }
        other => panic!("expected transport error, got {:?}", other.err()),
    }
    assert!(channel.requests_for(methods::JOIN).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_join_rejection_releases_everything() {
    let channel = MockChannel::builder()
        .reject(methods::JOIN, "room is full")
        .build();
    let harness = SessionHarness::new().with_channel(channel);
    let capture = harness.capture.clone();
    let device = harness.device.clone();

    let result = harness.start().await;

    assert!(matches!(result, Err(SessionError::Signaling(_))));
    for source in [TrackSource::Audio, TrackSource::Video] {
        let track = capture.last_track(source).unwrap();
        assert!(track.is_stopped(), "{source} track still captured");
    }
    assert!(device.transport(Direction::Send).unwrap().is_closed());
    assert!(device.transport(Direction::Receive).unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_send_transport_failure_degrades_session() {
    let device = MockDevice::builder().fail_transport(Direction::Send).build();
    let session = SessionHarness::new().with_device(device).start().await.unwrap();
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.send_transport, None);
    assert_eq!(state.receive_transport, Some(TransportState::New));
    assert!(state.is_degraded());
    assert!(matches!(
        state.transport_failures.as_slice(),
        [TransportFailure::Engine {
            direction: Direction::Send,
            ..
        }]
    ));

    // Nothing to publish on, but the join still happens.
    assert!(session.channel.requests_for(methods::PRODUCE).is_empty());
    assert_eq!(session.channel.requests_for(methods::JOIN).len(), 1);
    assert!(state.local_media.video_producer.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_receive_transport_signaling_failure_degrades_session() {
    let channel = MockChannel::builder()
        .reject(methods::CREATE_CONSUMER_TRANSPORT, "no ports")
        .build();
    let session = SessionHarness::new()
        .with_channel(channel)
        .start()
        .await
        .unwrap();

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.receive_transport, None);
    assert!(state.local_media.audio_producer.is_some());
    assert!(matches!(
        state.transport_failures.as_slice(),
        [TransportFailure::Signaling {
            direction: Direction::Receive,
            ..
        }]
    ));
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_leave_tears_everything_down() {
    let channel = MockChannel::builder()
        .consume_tracks("peer-b", &[MediaKind::Audio])
        .build();
    let mut session = SessionHarness::new()
        .with_channel(channel)
        .start()
        .await
        .unwrap();
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;
    session.drain_events();

    session.handle.leave().await.unwrap();
    settle().await;

    assert!(session.task.is_finished());
    assert!(session.handle.is_cancelled());
    assert!(!session.handle.widget_signal().borrow().active);
    assert_eq!(session.keep_alive.stopped(), 1);

    for source in [TrackSource::Audio, TrackSource::Video] {
        assert!(session.capture.last_track(source).unwrap().is_stopped());
    }
    let receive = session.device.transport(Direction::Receive).unwrap();
    assert!(receive.is_closed());
    assert!(receive.consumers().iter().all(|c| c.is_closed()));
    assert!(session.device.transport(Direction::Send).unwrap().is_closed());

    let sink = session.sinks.sink("peer-b", MediaKind::Audio).unwrap();
    assert_eq!(sink.attach_history().last(), Some(&None));

    let events = session.drain_events();
    assert_eq!(events.last(), Some(&SessionEvent::Ended(EndReason::Left)));
    assert!(matches!(
        session.handle.state().await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_ends_session() {
    let mut session = SessionHarness::new().start().await.unwrap();

    session.remote.close().await;
    settle().await;

    assert!(session.task.is_finished());
    assert!(!session.handle.widget_signal().borrow().active);
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::Ended(EndReason::ChannelClosed)]
    );
    assert!(session
        .capture
        .last_track(TrackSource::Video)
        .unwrap()
        .is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_tears_down_like_leave() {
    let mut session = SessionHarness::new().start().await.unwrap();

    session.handle.cancel();
    settle().await;

    assert!(session.task.is_finished());
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::Ended(EndReason::Left)]
    );
    assert_eq!(session.keep_alive.stopped(), 1);
}

// ============================================================================
// Presentation and liveness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_widget_visibility_is_independent_of_liveness() {
    let session = SessionHarness::new().start().await.unwrap();
    let widget = session.handle.widget_signal();
    assert!(widget.borrow().active);
    assert!(widget.borrow().visible);

    session.handle.set_visible(false).await.unwrap();
    settle().await;

    assert!(!widget.borrow().visible);
    assert!(widget.borrow().active);
    assert_eq!(session.channel.notification_count(methods::PING), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_only_while_hidden() {
    let session = SessionHarness::new().start().await.unwrap();
    settle().await;
    assert_eq!(session.keep_alive.started(), 1);
    assert_eq!(session.keep_alive.last_gain(), Some(0.001));

    // Visible: no pings.
    tokio::time::advance(Duration::from_secs(25)).await;
    settle().await;
    assert_eq!(session.channel.notification_count(methods::PING), 0);

    // Hidden: immediate ping, then one per interval.
    session
        .handle
        .set_visibility(Visibility::Hidden)
        .await
        .unwrap();
    settle().await;
    assert_eq!(session.channel.notification_count(methods::PING), 1);
    assert_eq!(session.keep_alive.resumed(), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(session.channel.notification_count(methods::PING) >= 2);

    // Visible again: pings stop.
    session
        .handle
        .set_visibility(Visibility::Visible)
        .await
        .unwrap();
    settle().await;
    let count = session.channel.notification_count(methods::PING);
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(session.channel.notification_count(methods::PING), count);
}
