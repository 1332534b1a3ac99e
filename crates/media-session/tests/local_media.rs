//! Tests for local publishing: initial publish, toggles and screen sharing.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use media_session::engine::Producer;
use common::protocol::methods;
use common::types::{Direction, MediaKind, TrackSource};
use media_session::actors::SessionEvent;
use media_session::errors::{CaptureError, ProduceError};
use media_session::media::{LocalTrack, MediaSink};
use serde_json::json;
use session_test_utils::*;
use std::sync::Arc;

fn producer_for_track(session: &RunningSession, track: &MockTrack) -> Arc<MockProducer> {
    session
        .device
        .transport(Direction::Send)
        .unwrap()
        .producers()
        .into_iter()
        .find(|p| p.track_id() == track.id())
        .expect("no producer bound to track")
}

// ============================================================================
// Initial publish
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_denied_microphone_does_not_block_camera() {
    let capture = MockCaptureSource::builder().deny(TrackSource::Audio).build();
    let session = SessionHarness::new().with_capture(capture).start().await.unwrap();

    let state = session.handle.state().await.unwrap();
    assert!(state.local_media.video_producer.is_some());
    assert!(state.local_media.audio_producer.is_none());
    assert_eq!(session.channel.requests_for(methods::PRODUCE).len(), 1);
    assert_eq!(session.channel.requests_for(methods::JOIN).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_camera_produce_does_not_block_microphone() {
    let device = MockDevice::builder().fail_produce(TrackSource::Video).build();
    let session = SessionHarness::new().with_device(device).start().await.unwrap();

    let state = session.handle.state().await.unwrap();
    assert!(state.local_media.video_producer.is_none());
    assert!(state.local_media.audio_producer.is_some());
    // The camera was captured, then released when producing failed.
    let camera = session.capture.last_track(TrackSource::Video).unwrap();
    assert!(camera.is_stopped());
    assert_eq!(state.local_media.active_video_source, None);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_kind_is_not_captured() {
    let device = MockDevice::builder().cannot_produce(MediaKind::Video).build();
    let session = SessionHarness::new().with_device(device).start().await.unwrap();

    let state = session.handle.state().await.unwrap();
    assert!(state.local_media.video_producer.is_none());
    assert!(state.local_media.audio_producer.is_some());
    assert!(session.capture.tracks(TrackSource::Video).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_preview_renders_camera() {
    let session = SessionHarness::new().start().await.unwrap();

    let camera = session.capture.last_track(TrackSource::Video).unwrap();
    let preview = session.preview.stream().unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(preview.tracks()[0].id, camera.id());
}

// ============================================================================
// Toggles
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_toggle_video_twice_broadcasts_twice() {
    let mut session = SessionHarness::new().start().await.unwrap();
    let camera = session.capture.last_track(TrackSource::Video).unwrap();

    assert!(!session.handle.toggle_video().await.unwrap());
    assert!(!camera.is_enabled());
    assert!(session.handle.toggle_video().await.unwrap());
    assert!(camera.is_enabled());

    assert_eq!(
        session.channel.notifications_for(methods::MEDIA_STATE_CHANGED),
        vec![
            json!({ "type": "video", "enabled": false }),
            json!({ "type": "video", "enabled": true }),
        ]
    );
    assert_eq!(
        session.drain_events(),
        vec![
            SessionEvent::LocalMediaChanged {
                kind: MediaKind::Video,
                enabled: false
            },
            SessionEvent::LocalMediaChanged {
                kind: MediaKind::Video,
                enabled: true
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_video_off_notifies_exactly_once() {
    let session = SessionHarness::new().start().await.unwrap();

    session.handle.toggle_video().await.unwrap();
    settle().await;

    assert_eq!(
        session.channel.notification_count(methods::MEDIA_STATE_CHANGED),
        1
    );
    let state = session.handle.state().await.unwrap();
    assert!(!state.local_media.video_enabled);
    // Disabling keeps the producer; only the track flag changes.
    assert!(state.local_media.video_producer.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_audio_survives_failed_broadcast() {
    let channel = MockChannel::builder()
        .fail_notifications(methods::MEDIA_STATE_CHANGED)
        .build();
    let session = SessionHarness::new()
        .with_channel(channel)
        .start()
        .await
        .unwrap();
    let microphone = session.capture.last_track(TrackSource::Audio).unwrap();

    assert!(!session.handle.toggle_audio().await.unwrap());
    assert!(!microphone.is_enabled());
    assert!(!session.handle.state().await.unwrap().local_media.audio_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_without_producer_still_flips_flag() {
    let capture = MockCaptureSource::builder()
        .not_found(TrackSource::Audio)
        .build();
    let session = SessionHarness::new().with_capture(capture).start().await.unwrap();

    assert!(!session.handle.toggle_audio().await.unwrap());
    assert_eq!(
        session.channel.notifications_for(methods::MEDIA_STATE_CHANGED),
        vec![json!({ "type": "audio", "enabled": false })]
    );
}

// ============================================================================
// Screen sharing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_share_and_stop_round_trip() {
    let mut session = SessionHarness::new().start().await.unwrap();
    let camera = session.capture.last_track(TrackSource::Video).unwrap();

    assert_eq!(session.handle.share_screen().await.unwrap(), Ok(true));

    let screen = session.capture.last_track(TrackSource::Screen).unwrap();
    let state = session.handle.state().await.unwrap();
    assert!(state.local_media.screen_sharing);
    assert!(state.local_media.screen_producer.is_some());
    assert_eq!(
        state.local_media.active_video_source,
        Some(TrackSource::Screen)
    );
    assert!(producer_for_track(&session, &camera).is_paused());
    assert_eq!(session.preview.stream().unwrap().tracks()[0].id, screen.id());

    // Already sharing.
    assert_eq!(session.handle.share_screen().await.unwrap(), Ok(false));

    assert!(session.handle.stop_screen_share().await.unwrap());

    let state = session.handle.state().await.unwrap();
    assert!(!state.local_media.screen_sharing);
    assert_eq!(
        state.local_media.active_video_source,
        Some(TrackSource::Video)
    );
    assert!(!producer_for_track(&session, &camera).is_paused());
    assert!(producer_for_track(&session, &screen).is_closed());
    assert!(screen.is_stopped());
    assert_eq!(session.preview.stream().unwrap().tracks()[0].id, camera.id());

    assert!(!session.handle.stop_screen_share().await.unwrap());

    assert_eq!(
        session.drain_events(),
        vec![
            SessionEvent::ScreenShareChanged { active: true },
            SessionEvent::ScreenShareChanged { active: false },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_screen_share_denied_leaves_camera_live() {
    let capture = MockCaptureSource::builder()
        .deny(TrackSource::Screen)
        .build();
    let session = SessionHarness::new().with_capture(capture).start().await.unwrap();
    let camera = session.capture.last_track(TrackSource::Video).unwrap();

    let result = session.handle.share_screen().await.unwrap();
    assert_eq!(
        result,
        Err(ProduceError::Capture(CaptureError::PermissionDenied(
            TrackSource::Screen
        )))
    );

    let state = session.handle.state().await.unwrap();
    assert!(!state.local_media.screen_sharing);
    assert!(!producer_for_track(&session, &camera).is_paused());
}

#[tokio::test(start_paused = true)]
async fn test_host_ending_screen_capture_stops_share() {
    let mut session = SessionHarness::new().start().await.unwrap();
    session.handle.share_screen().await.unwrap().unwrap();
    session.drain_events();

    session.capture.last_track(TrackSource::Screen).unwrap().end();
    settle().await;

    let state = session.handle.state().await.unwrap();
    assert!(!state.local_media.screen_sharing);
    assert_eq!(
        state.local_media.active_video_source,
        Some(TrackSource::Video)
    );
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::ScreenShareChanged { active: false }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_ended_camera_track_is_not_treated_as_share_end() {
    let mut session = SessionHarness::new().start().await.unwrap();
    session.handle.share_screen().await.unwrap().unwrap();
    session.drain_events();

    session.capture.last_track(TrackSource::Video).unwrap().end();
    settle().await;

    assert!(session.handle.state().await.unwrap().local_media.screen_sharing);
    assert!(session.drain_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_video_while_sharing_applies_to_screen() {
    let session = SessionHarness::new().start().await.unwrap();
    session.handle.share_screen().await.unwrap().unwrap();
    let screen = session.capture.last_track(TrackSource::Screen).unwrap();

    session.handle.toggle_video().await.unwrap();

    assert!(!screen.is_enabled());
    assert!(!session
        .capture
        .last_track(TrackSource::Video)
        .unwrap()
        .is_enabled());
}
