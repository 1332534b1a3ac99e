//! Producer management.
//!
//! Owns the local microphone, camera and screen producers. At most one video
//! producer is active at a time: while sharing, the camera producer is paused
//! and the screen producer substitutes it in the local preview. The audio
//! producer is never touched by screen sharing.

use crate::actors::messages::{LocalMediaState, SessionMessage};
use crate::capability::CapabilityHandle;
use crate::engine::{EngineTransport, Producer};
use crate::errors::ProduceError;
use crate::media::{CaptureSource, LocalTrack, MediaSink, MediaStream};
use crate::observability::metrics;

use common::mailbox::MailboxSender;
use common::types::{ProducerId, TrackSource};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A published local track.
struct LocalProducer {
    producer: Arc<dyn Producer>,
    track: Arc<dyn LocalTrack>,
    watcher: CancellationToken,
}

impl LocalProducer {
    fn id(&self) -> &ProducerId {
        self.producer.id()
    }

    fn stream(&self) -> MediaStream {
        MediaStream::from_track(self.track.track_ref())
    }

    fn close(&self) {
        self.watcher.cancel();
        self.producer.close();
        self.track.stop();
    }
}

/// Outcome of the initial publish. Each kind succeeds or fails on its own.
#[derive(Debug)]
pub struct PublishReport {
    pub video: Result<ProducerId, ProduceError>,
    pub audio: Result<ProducerId, ProduceError>,
}

impl PublishReport {
    /// Whether nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.video.is_err() && self.audio.is_err()
    }
}

pub struct ProducerManager {
    capture: Arc<dyn CaptureSource>,
    capability: CapabilityHandle,
    transport: Option<Arc<dyn EngineTransport>>,
    preview: Option<Arc<dyn MediaSink>>,
    session: MailboxSender<SessionMessage>,
    cancel_token: CancellationToken,
    audio: Option<LocalProducer>,
    camera: Option<LocalProducer>,
    screen: Option<LocalProducer>,
    audio_enabled: bool,
    video_enabled: bool,
}

impl ProducerManager {
    /// `transport` is `None` when the send transport could not be created;
    /// every publish then fails with `ProduceError::NoTransport`.
    #[must_use]
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        capability: CapabilityHandle,
        transport: Option<Arc<dyn EngineTransport>>,
        preview: Option<Arc<dyn MediaSink>>,
        session: MailboxSender<SessionMessage>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            capture,
            capability,
            transport,
            preview,
            session,
            cancel_token,
            audio: None,
            camera: None,
            screen: None,
            audio_enabled: true,
            video_enabled: true,
        }
    }

    /// Publish camera then microphone. A failure of one never blocks the other.
    pub async fn publish_all(&mut self) -> PublishReport {
        let video = self.publish(TrackSource::Video).await;
        let audio = self.publish(TrackSource::Audio).await;
        PublishReport { video, audio }
    }

    /// Acquire a microphone or camera track and bind it to the send transport.
    ///
    /// Publishing an already published source returns the existing producer.
    pub async fn publish(&mut self, source: TrackSource) -> Result<ProducerId, ProduceError> {
        if source == TrackSource::Screen {
            self.share_screen().await?;
            return self
                .screen
                .as_ref()
                .map(|s| s.id().clone())
                .ok_or(ProduceError::NoTransport);
        }

        if let Some(existing) = self.slot(source) {
            return Ok(existing.id().clone());
        }

        let local = match self.acquire_and_produce(source).await {
            Ok(local) => local,
            Err(e) => {
                warn!(
                    target: "session.producer",
                    source = %source,
                    error = %e,
                    "Publish failed"
                );
                metrics::record_produce_failure(source.as_str());
                return Err(e);
            }
        };

        let id = local.id().clone();
        match source {
            TrackSource::Audio => {
                local.track.set_enabled(self.audio_enabled);
                self.audio = Some(local);
            }
            TrackSource::Video | TrackSource::Screen => {
                local.track.set_enabled(self.video_enabled);
                // A camera published mid-share stays paused until the share stops.
                if self.screen.is_none() {
                    self.render_preview(Some(local.stream()));
                } else {
                    local.producer.pause();
                }
                self.camera = Some(local);
            }
        }

        info!(
            target: "session.producer",
            source = %source,
            producer_id = %id,
            "Published local track"
        );
        Ok(id)
    }

    /// Flip the microphone flag. Returns the new state.
    pub fn toggle_audio(&mut self) -> bool {
        self.audio_enabled = !self.audio_enabled;
        if let Some(audio) = &self.audio {
            audio.track.set_enabled(self.audio_enabled);
        }
        self.audio_enabled
    }

    /// Flip the camera flag (and the screen track's while sharing). Returns the new state.
    pub fn toggle_video(&mut self) -> bool {
        self.video_enabled = !self.video_enabled;
        for local in [&self.camera, &self.screen].into_iter().flatten() {
            local.track.set_enabled(self.video_enabled);
        }
        self.video_enabled
    }

    /// Substitute a screen capture for the camera. `Ok(false)` if already sharing.
    pub async fn share_screen(&mut self) -> Result<bool, ProduceError> {
        if self.screen.is_some() {
            return Ok(false);
        }

        let screen = match self.acquire_and_produce(TrackSource::Screen).await {
            Ok(screen) => screen,
            Err(e) => {
                warn!(
                    target: "session.producer",
                    error = %e,
                    "Screen share failed"
                );
                metrics::record_produce_failure(TrackSource::Screen.as_str());
                return Err(e);
            }
        };

        if let Some(camera) = &self.camera {
            camera.producer.pause();
        }
        self.render_preview(Some(screen.stream()));

        info!(
            target: "session.producer",
            producer_id = %screen.id(),
            "Screen share started"
        );
        self.screen = Some(screen);
        Ok(true)
    }

    /// Close the screen producer and restore the camera. `false` if not sharing.
    pub fn stop_screen_share(&mut self) -> bool {
        let Some(screen) = self.screen.take() else {
            return false;
        };
        screen.close();

        let camera_stream = self.camera.as_ref().map(|camera| {
            camera.producer.resume();
            camera.stream()
        });
        self.render_preview(camera_stream);

        info!(target: "session.producer", "Screen share stopped");
        true
    }

    /// Whether `track_id` is the current track for `source`.
    #[must_use]
    pub fn is_current_track(&self, source: TrackSource, track_id: &str) -> bool {
        self.slot(source).is_some_and(|p| p.track.id() == track_id)
    }

    /// Drop the send transport and everything bound to it.
    pub fn release_transport(&mut self) {
        self.close_all();
        self.transport = None;
    }

    /// Close every producer and release the captured devices.
    pub fn close_all(&mut self) {
        for local in [self.screen.take(), self.camera.take(), self.audio.take()]
            .into_iter()
            .flatten()
        {
            debug!(
                target: "session.producer",
                producer_id = %local.id(),
                "Closing producer"
            );
            local.close();
        }
        self.render_preview(None);
    }

    #[must_use]
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    #[must_use]
    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    #[must_use]
    pub fn is_sharing(&self) -> bool {
        self.screen.is_some()
    }

    #[must_use]
    pub fn state(&self) -> LocalMediaState {
        let active_video_source = if self.screen.is_some() {
            Some(TrackSource::Screen)
        } else if self.camera.is_some() {
            Some(TrackSource::Video)
        } else {
            None
        };

        LocalMediaState {
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            screen_sharing: self.screen.is_some(),
            audio_producer: self.audio.as_ref().map(|p| p.id().clone()),
            video_producer: self.camera.as_ref().map(|p| p.id().clone()),
            screen_producer: self.screen.as_ref().map(|p| p.id().clone()),
            active_video_source,
        }
    }

    fn slot(&self, source: TrackSource) -> Option<&LocalProducer> {
        match source {
            TrackSource::Audio => self.audio.as_ref(),
            TrackSource::Video => self.camera.as_ref(),
            TrackSource::Screen => self.screen.as_ref(),
        }
    }

    async fn acquire_and_produce(&self, source: TrackSource) -> Result<LocalProducer, ProduceError> {
        let transport = self.transport.clone().ok_or(ProduceError::NoTransport)?;
        if !self.capability.can_produce(source.media_kind()) {
            return Err(ProduceError::Unsupported(source));
        }

        let track = self.capture.acquire(source).await?;
        let producer = match transport.produce(Arc::clone(&track)).await {
            Ok(producer) => producer,
            Err(e) => {
                track.stop();
                return Err(e.into());
            }
        };

        let watcher = self.watch_track(&track, source);
        Ok(LocalProducer {
            producer,
            track,
            watcher,
        })
    }

    /// Forward the track's ended/mute/unmute events to the session actor.
    fn watch_track(&self, track: &Arc<dyn LocalTrack>, source: TrackSource) -> CancellationToken {
        let token = self.cancel_token.child_token();
        let mut events = track.subscribe();
        let track_id = track.id().to_string();
        let session = self.session.clone();
        let cancel = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            let message = SessionMessage::LocalTrackEvent {
                                source,
                                track_id: track_id.clone(),
                                event,
                            };
                            if session.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        token
    }

    fn render_preview(&self, stream: Option<MediaStream>) {
        if let Some(preview) = &self.preview {
            preview.attach(stream);
        }
    }
}
