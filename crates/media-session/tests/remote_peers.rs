//! Tests for remote peers: the registry, consumer managers and playback recovery.
//!
//! Uses tokio's paused clock so the health loop and the playback settle
//! check can be driven deterministically.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use media_session::engine::EngineTransport;
use media_session::engine::Consumer;
use common::protocol::methods;
use common::types::{Direction, MediaKind, PeerId};
use media_session::actors::SessionEvent;
use media_session::errors::TransportFailure;
use media_session::media::{MediaSink, PlaybackStatus, ReadyState};
use media_session::transport::TransportState;
use serde_json::json;
use session_test_utils::*;
use std::time::Duration;
use tokio::time::timeout;

async fn start_with_tracks(peers: &[(&str, &[MediaKind])]) -> RunningSession {
    let mut builder = MockChannel::builder();
    for (peer, kinds) in peers {
        builder = builder.consume_tracks(peer, kinds);
    }
    SessionHarness::new()
        .with_channel(builder.build())
        .start()
        .await
        .unwrap()
}

fn peer_ids(peers: &[media_session::registry::Peer]) -> Vec<&str> {
    peers.iter().map(|p| p.id.as_str()).collect()
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_snapshot_then_peer_left() {
    let session = start_with_tracks(&[]).await;

    session
        .remote
        .notify(available_peers(&[("peer-b", "Bob"), ("peer-c", "Carol")]))
        .await;
    settle().await;

    let peers = session.handle.peers().await.unwrap();
    assert_eq!(peer_ids(&peers), vec!["peer-b", "peer-c"]);
    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 2);

    session.remote.notify(peer_left("peer-b")).await;
    settle().await;

    let peers = session.handle.peers().await.unwrap();
    assert_eq!(peer_ids(&peers), vec!["peer-c"]);
    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_replaces_roster() {
    let session = start_with_tracks(&[]).await;

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    session
        .remote
        .notify(available_peers(&[("peer-c", "Carol")]))
        .await;
    settle().await;

    let peers = session.handle.peers().await.unwrap();
    assert_eq!(peer_ids(&peers), vec!["peer-c"]);
    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_local_participant_is_never_exposed() {
    let session = start_with_tracks(&[]).await;

    session
        .remote
        .notify(available_peers(&[
            (LOCAL_PEER_ID, "Someone"),
            ("peer-x", TEST_DISPLAY_NAME),
            ("peer-b", "Bob"),
        ]))
        .await;
    settle().await;

    let peers = session.handle.peers().await.unwrap();
    assert_eq!(peer_ids(&peers), vec!["peer-b"]);
    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 1);
    // No consume request for the local participant.
    let consumed: Vec<_> = session.channel.requests_for(methods::CONSUME);
    assert_eq!(consumed, vec![json!({ "peerId": "peer-b" })]);
}

#[tokio::test(start_paused = true)]
async fn test_peer_media_state_updates_registry() {
    let mut session = start_with_tracks(&[]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;
    session.drain_events();

    session
        .remote
        .notify(media_state("peer-b", MediaKind::Video, false))
        .await;
    // Unknown peers and unchanged values are ignored.
    session
        .remote
        .notify(media_state("peer-z", MediaKind::Audio, false))
        .await;
    session
        .remote
        .notify(media_state("peer-b", MediaKind::Video, false))
        .await;
    settle().await;

    let peers = session.handle.peers().await.unwrap();
    assert!(!peers[0].video_enabled);
    assert!(peers[0].audio_enabled);
    assert_eq!(session.drain_events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_malformed_notifications_are_ignored() {
    let session = start_with_tracks(&[]).await;

    session.remote.raw("activeSpeaker", json!({ "id": "x" })).await;
    session.remote.raw(methods::PEER_LEFT, json!({ "nope": 1 })).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    assert!(!session.task.is_finished());
    let peers = session.handle.peers().await.unwrap();
    assert_eq!(peer_ids(&peers), vec!["peer-b"]);
}

#[tokio::test(start_paused = true)]
async fn test_membership_changes_emit_peers_changed() {
    let mut session = start_with_tracks(&[]).await;

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    match session.drain_events().as_slice() {
        [SessionEvent::PeersChanged(peers)] => {
            assert_eq!(peer_ids(peers), vec!["peer-b"]);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

// ============================================================================
// Consumer managers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_manager_per_peer_destroyed_once() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Audio, MediaKind::Video])]).await;

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 1);
    assert_eq!(session.channel.requests_for(methods::CONSUME).len(), 1);
    assert_eq!(session.sinks.created(), 2);

    let receive = session.device.transport(Direction::Receive).unwrap();
    assert_eq!(receive.consumers().len(), 2);

    session.remote.notify(peer_left("peer-b")).await;
    session.remote.notify(peer_left("peer-b")).await;
    settle().await;

    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 0);
    assert!(receive.consumers().iter().all(|c| c.is_closed()));
    for kind in [MediaKind::Audio, MediaKind::Video] {
        let sink = session.sinks.sink("peer-b", kind).unwrap();
        let cleared = sink
            .attach_history()
            .iter()
            .filter(|stream| stream.is_none())
            .count();
        assert_eq!(cleared, 1, "{kind} sink cleared more than once");
    }
}

#[tokio::test(start_paused = true)]
async fn test_consumption_wires_playback_and_resumes() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Audio, MediaKind::Video])]).await;

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert!(playback.active);
    assert_eq!(playback.consumers.len(), 2);
    assert!(playback
        .consumers
        .iter()
        .all(|c| c.playback == PlaybackStatus::Playing));

    assert_eq!(session.channel.notification_count(methods::RESUME_CONSUMER), 2);

    let receive = session.device.transport(Direction::Receive).unwrap();
    assert!(receive.is_connected());
    let state = session.handle.state().await.unwrap();
    assert_eq!(state.receive_transport, Some(TransportState::Connected));

    let video = session.sinks.sink("peer-b", MediaKind::Video).unwrap();
    assert!(!video.is_muted());
    assert_eq!(video.stream().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_same_kind_tracks_share_one_stream_and_sink() {
    let session = start_with_tracks(&[(
        "peer-b",
        &[MediaKind::Video, MediaKind::Video, MediaKind::Audio],
    )])
    .await;

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    assert_eq!(session.sinks.created(), 2);
    let video = session.sinks.sink("peer-b", MediaKind::Video).unwrap();
    assert_eq!(video.stream().unwrap().len(), 2);
    let audio = session.sinks.sink("peer-b", MediaKind::Audio).unwrap();
    assert_eq!(audio.stream().unwrap().len(), 1);

    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(playback.consumers.len(), 3);
    assert_eq!(session.channel.notification_count(methods::RESUME_CONSUMER), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_track_does_not_block_sibling() {
    let device = MockDevice::builder().fail_consume(MediaKind::Video).build();
    let channel = MockChannel::builder()
        .consume_tracks("peer-b", &[MediaKind::Video, MediaKind::Audio])
        .build();
    let session = SessionHarness::new()
        .with_device(device)
        .with_channel(channel)
        .start()
        .await
        .unwrap();

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(playback.consumers.len(), 1);
    assert_eq!(playback.consumers[0].kind, MediaKind::Audio);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_consume_leaves_manager_running() {
    let channel = MockChannel::builder()
        .reject(methods::CONSUME, "peer has no producers")
        .build();
    let session = SessionHarness::new()
        .with_channel(channel)
        .start()
        .await
        .unwrap();

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert!(playback.active);
    assert!(playback.consumers.is_empty());
    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 1);
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_rejection_falls_back_to_muted() {
    let channel = MockChannel::builder()
        .consume_tracks("peer-b", &[MediaKind::Video])
        .build();
    let session = SessionHarness::new()
        .with_channel(channel)
        .with_sinks(MockSinkFactory::rejecting_unmuted_play())
        .start()
        .await
        .unwrap();

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let sink = session.sinks.sink("peer-b", MediaKind::Video).unwrap();
    assert!(sink.is_muted());
    assert!(!sink.is_paused());
    assert_eq!(sink.play_calls(), 2);
}

// ============================================================================
// Playback recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stalled_playback_recovers_within_two_health_cycles() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Audio, MediaKind::Video])]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;
    let resumes_before = session.channel.notification_count(methods::RESUME_CONSUMER);

    // Buffering stalls without the sink being paused.
    let video = session.sinks.sink("peer-b", MediaKind::Video).unwrap();
    video.set_ready_state(ReadyState::HaveMetadata);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;

    assert_eq!(video.ready_state(), ReadyState::HaveEnoughData);
    assert!(session.channel.notification_count(methods::RESUME_CONSUMER) > resumes_before);

    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert!(playback
        .consumers
        .iter()
        .all(|c| c.playback == PlaybackStatus::Playing));
}

#[tokio::test(start_paused = true)]
async fn test_healthy_playback_is_left_alone() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Audio])]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let audio = session.sinks.sink("peer-b", MediaKind::Audio).unwrap();
    let plays = audio.play_calls();

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(audio.play_calls(), plays);
    assert_eq!(session.channel.notification_count(methods::RESUME_CONSUMER), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sink_still_paused_after_settle_delay_replays_muted() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Video])]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let video = session.sinks.sink("peer-b", MediaKind::Video).unwrap();
    video.set_paused(true);

    // Past the settle delay, before the first health check.
    tokio::time::advance(Duration::from_millis(2_500)).await;
    settle().await;

    assert!(!video.is_paused());
    assert!(video.is_muted());
    // Recovered by the settle check alone.
    assert_eq!(session.channel.notification_count(methods::RESUME_CONSUMER), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_loop_stops_with_manager() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Audio])]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;
    session.remote.notify(peer_left("peer-b")).await;
    settle().await;

    let resumes = session.channel.notification_count(methods::RESUME_CONSUMER);
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(
        session.channel.notification_count(methods::RESUME_CONSUMER),
        resumes
    );
}

// ============================================================================
// Slow peers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unanswered_resume_does_not_stall_session() {
    let channel = MockChannel::builder()
        .consume_tracks("peer-b", &[MediaKind::Video])
        .stall_notifications(methods::RESUME_CONSUMER)
        .build();
    let session = SessionHarness::new()
        .with_channel(channel)
        .start()
        .await
        .unwrap();

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    let playback = timeout(
        Duration::from_secs(1),
        session.handle.peer_playback(PeerId::from("peer-b")),
    )
    .await
    .expect("peer_playback blocked")
    .unwrap()
    .unwrap();
    assert_eq!(playback.consumers.len(), 1);
    assert_eq!(playback.consumers[0].playback, PlaybackStatus::Playing);

    let enabled = timeout(Duration::from_secs(1), session.handle.toggle_audio())
        .await
        .expect("toggle_audio blocked")
        .unwrap();
    assert!(!enabled);

    session.remote.notify(peer_left("peer-b")).await;
    settle().await;

    let receive = session.device.transport(Direction::Receive).unwrap();
    assert_eq!(receive.consumers().len(), 1);
    assert!(receive.consumers().iter().all(|c| c.is_closed()));
}

#[tokio::test(start_paused = true)]
async fn test_peer_leaving_mid_consume_closes_created_consumers() {
    let session = SessionHarness::new()
        .with_channel(
            MockChannel::builder()
                .consume_tracks("peer-b", &[MediaKind::Audio, MediaKind::Video])
                .build(),
        )
        .with_sinks(MockSinkFactory::stalling_play())
        .start()
        .await
        .unwrap();

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    // Stuck playing the first track; the second was never consumed.
    let receive = session.device.transport(Direction::Receive).unwrap();
    assert_eq!(receive.consumers().len(), 1);

    let playback = timeout(
        Duration::from_secs(1),
        session.handle.peer_playback(PeerId::from("peer-b")),
    )
    .await
    .expect("peer_playback blocked")
    .unwrap()
    .unwrap();
    assert_eq!(playback.consumers.len(), 1);

    session.remote.notify(peer_left("peer-b")).await;
    settle().await;

    assert_eq!(session.handle.state().await.unwrap().consumer_managers, 0);
    assert!(receive.consumers().iter().all(|c| c.is_closed()));
    let sink = session.sinks.sink("peer-b", MediaKind::Audio).unwrap();
    assert!(sink.attach_history().last().unwrap().is_none());
}

// ============================================================================
// Receive transport failure
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_receive_transport_failure_degrades_session() {
    let mut session =
        start_with_tracks(&[("peer-b", &[MediaKind::Audio, MediaKind::Video])]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;
    session.drain_events();

    let receive = session.device.transport(Direction::Receive).unwrap();
    receive.emit_state(TransportState::Failed);
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.receive_transport, None);
    assert_eq!(state.send_transport, Some(TransportState::Connected));
    assert_eq!(
        state.transport_failures,
        vec![TransportFailure::ConnectionFailed {
            direction: Direction::Receive
        }]
    );
    assert!(receive.is_closed());
    assert!(receive.consumers().iter().all(|c| c.is_closed()));

    // The peer keeps an idle manager.
    assert_eq!(state.consumer_managers, 1);
    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert!(!playback.active);
    assert!(playback.consumers.is_empty());

    assert!(session.drain_events().contains(&SessionEvent::TransportFailed(
        TransportFailure::ConnectionFailed {
            direction: Direction::Receive
        }
    )));

    // Publishing is unaffected.
    assert!(!session.handle.toggle_audio().await.unwrap());
    assert!(state.local_media.audio_producer.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_send_transport_failure_releases_producers_only() {
    let session = start_with_tracks(&[("peer-b", &[MediaKind::Audio])]).await;
    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;

    session
        .device
        .transport(Direction::Send)
        .unwrap()
        .emit_state(TransportState::Failed);
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.send_transport, None);
    assert!(state.local_media.audio_producer.is_none());
    assert!(state.local_media.video_producer.is_none());
    assert_eq!(state.receive_transport, Some(TransportState::Connected));

    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert!(playback.active);
    assert_eq!(playback.consumers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manager_without_receive_transport_is_idle() {
    let device = MockDevice::builder()
        .fail_transport(Direction::Receive)
        .build();
    let session = SessionHarness::new().with_device(device).start().await.unwrap();

    session.remote.notify(peer_joined("peer-b", "Bob")).await;
    settle().await;
    tokio::time::advance(Duration::from_secs(20)).await;
    settle().await;

    assert!(session.channel.requests_for(methods::CONSUME).is_empty());
    assert_eq!(session.sinks.created(), 0);
    let playback = session
        .handle
        .peer_playback(PeerId::from("peer-b"))
        .await
        .unwrap()
        .unwrap();
    assert!(!playback.active);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_transport_transition_is_ignored() {
    let session = start_with_tracks(&[]).await;
    settle().await;

    let send = session.device.transport(Direction::Send).unwrap();
    send.emit_state(TransportState::New);
    send.emit_state(TransportState::Connecting);
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.send_transport, Some(TransportState::Connected));
    assert!(state.transport_failures.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_burst_of_state_reports_is_not_dropped() {
    let session = start_with_tracks(&[]).await;
    settle().await;

    let send = session.device.transport(Direction::Send).unwrap();
    for _ in 0..300 {
        send.emit_state(TransportState::Connecting);
    }
    send.emit_state(TransportState::Failed);
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert_eq!(state.send_transport, None);
    assert_eq!(
        state.transport_failures,
        vec![TransportFailure::ConnectionFailed {
            direction: Direction::Send
        }]
    );
}
