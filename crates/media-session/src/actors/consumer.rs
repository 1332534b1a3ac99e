//! `ConsumerActor` - per-peer consumer manager.
//!
//! Each `ConsumerActor`:
//! - Consumes every track of exactly one remote peer over the receive transport
//! - Accumulates same-kind tracks into one stream per kind and plays it
//! - Runs the health/recovery loop for the lifetime of the manager
//!
//! # Lifecycle
//!
//! 1. Spawned by the `SessionActor` when a peer appears in the exposed list
//! 2. Stays idle (no traffic, no error) while the receive transport or peer id is missing
//! 3. Cancelled via its child token when the peer leaves or the session ends;
//!    teardown closes every consumer and clears every sink
//!
//! # Recovery
//!
//! Every health interval, each consumer whose sink is paused or not yet
//! buffered gets a `resumeConsumer` notification and its sink is replayed,
//! muted if the direct replay is rejected. Recovery never waits for a
//! transport failure. A one-shot settle check runs shortly after the first
//! playback attempt.
//!
//! `resumeConsumer` notifications are detached tasks; the manager never waits
//! on them. Playback status is published on a `watch` channel, so readers
//! never wait on the manager either.

use super::messages::{ConsumerStatus, PeerPlayback};

use crate::engine::{Consumer, EngineTransport};
use crate::errors::ConsumeError;
use crate::media::{MediaSink, MediaStream, SinkFactory};
use crate::observability::metrics;
use crate::signaling::Signaling;

use common::types::{ConsumerId, MediaKind, PeerId, ProducerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Shared dependencies for consumer actors.
#[derive(Clone)]
pub struct ConsumerDeps {
    pub signaling: Signaling,
    /// `None` while no receive transport is available.
    pub transport: Option<Arc<dyn EngineTransport>>,
    pub sinks: Arc<dyn SinkFactory>,
    pub health_check_interval: Duration,
    pub playback_settle_delay: Duration,
}

/// A consumer owned by the manager; closed on teardown.
struct OwnedConsumer {
    consumer: Arc<dyn Consumer>,
}

/// One owned consumer and the sink it plays on.
#[derive(Clone)]
struct PlaybackEntry {
    consumer_id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    sink: Arc<dyn MediaSink>,
}

/// What a manager currently owns, as seen by its handle.
#[derive(Clone, Default)]
struct PlaybackView {
    active: bool,
    entries: Vec<PlaybackEntry>,
}

/// Handle to a `ConsumerActor`.
#[derive(Clone)]
pub struct ConsumerActorHandle {
    playback: watch::Receiver<PlaybackView>,
    cancel_token: CancellationToken,
    peer_id: PeerId,
}

impl std::fmt::Debug for ConsumerActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerActorHandle")
            .field("peer_id", &self.peer_id)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ConsumerActorHandle {
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Playback status of every owned consumer, read from the sinks now.
    #[must_use]
    pub fn playback(&self) -> PeerPlayback {
        let view = self.playback.borrow();
        PeerPlayback {
            peer_id: self.peer_id.clone(),
            active: view.active,
            consumers: view
                .entries
                .iter()
                .map(|entry| ConsumerStatus {
                    consumer_id: entry.consumer_id.clone(),
                    producer_id: entry.producer_id.clone(),
                    kind: entry.kind,
                    playback: entry.sink.playback_status(),
                })
                .collect(),
        }
    }

    /// Cancel the actor. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

pub struct ConsumerActor {
    peer_id: PeerId,
    display_name: String,
    deps: ConsumerDeps,
    cancel_token: CancellationToken,
    playback: watch::Sender<PlaybackView>,
    consumers: Vec<OwnedConsumer>,
    streams: HashMap<MediaKind, MediaStream>,
    sinks: HashMap<MediaKind, Arc<dyn MediaSink>>,
    recovery_attempts: u64,
}

impl ConsumerActor {
    /// Spawn a consumer manager for one peer.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        peer_id: PeerId,
        display_name: String,
        deps: ConsumerDeps,
        cancel_token: CancellationToken,
    ) -> (ConsumerActorHandle, JoinHandle<()>) {
        let active = deps.transport.is_some() && !peer_id.is_empty();
        let (playback, playback_rx) = watch::channel(PlaybackView {
            active,
            entries: Vec::new(),
        });

        let actor = Self {
            peer_id: peer_id.clone(),
            display_name,
            deps,
            cancel_token: cancel_token.clone(),
            playback,
            consumers: Vec::new(),
            streams: HashMap::new(),
            sinks: HashMap::new(),
            recovery_attempts: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConsumerActorHandle {
            playback: playback_rx,
            cancel_token,
            peer_id,
        };

        (handle, task_handle)
    }

    fn is_ready(&self) -> bool {
        self.deps.transport.is_some() && !self.peer_id.is_empty()
    }

    #[instrument(
        skip_all,
        name = "session.consumer",
        fields(peer_id = %self.peer_id, display_name = %self.display_name)
    )]
    async fn run(mut self) {
        let ready = self.is_ready();
        debug!(
            target: "session.consumer",
            peer_id = %self.peer_id,
            ready = ready,
            "ConsumerActor started"
        );

        if ready {
            let cancel = self.cancel_token.clone();
            tokio::select! {
                () = cancel.cancelled() => {
                    // Consumers created so far are already owned.
                    self.teardown();
                    return;
                }
                () = self.consume_from_peer() => {}
            }
        }

        let period = self.deps.health_check_interval;
        let mut health_check = tokio::time::interval_at(Instant::now() + period, period);
        let settle = tokio::time::sleep(self.deps.playback_settle_delay);
        tokio::pin!(settle);
        let mut settle_pending = ready && !self.consumers.is_empty();

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "session.consumer",
                        peer_id = %self.peer_id,
                        "ConsumerActor received cancellation signal"
                    );
                    break;
                }

                _ = health_check.tick(), if ready => {
                    self.check_playback_health().await;
                }

                () = &mut settle, if settle_pending => {
                    settle_pending = false;
                    self.settle_check().await;
                }
            }
        }

        self.teardown();
    }

    /// Request every consumable track of the peer and start playback.
    async fn consume_from_peer(&mut self) {
        let Some(transport) = self.deps.transport.clone() else {
            return;
        };

        let response = match self.deps.signaling.consume(self.peer_id.clone()).await {
            Ok(response) => response,
            Err(e) => {
                let err = ConsumeError::from(e);
                warn!(
                    target: "session.consumer",
                    peer_id = %self.peer_id,
                    error = %err,
                    "Consume request failed"
                );
                metrics::record_consume_failure("all");
                return;
            }
        };

        info!(
            target: "session.consumer",
            peer_id = %self.peer_id,
            tracks = response.consumer_details_array.len(),
            "Consuming from peer"
        );

        for details in response.consumer_details_array {
            let consumer_id = details.id.clone();
            let kind = details.kind;

            let consumer = match transport.consume(details).await {
                Ok(consumer) => consumer,
                Err(source) => {
                    let err = ConsumeError::Engine {
                        consumer_id,
                        kind,
                        source,
                    };
                    warn!(
                        target: "session.consumer",
                        peer_id = %self.peer_id,
                        error = %err,
                        "Consumer creation failed"
                    );
                    metrics::record_consume_failure(kind.as_str());
                    continue;
                }
            };

            // Owned before any further await so teardown always closes it.
            self.consumers.push(OwnedConsumer {
                consumer: Arc::clone(&consumer),
            });

            let stream = self.streams.entry(kind).or_default();
            stream.add_track(consumer.track());
            let stream = stream.clone();

            let sink = self.sink_for(kind);
            sink.attach(Some(stream));
            sink.set_muted(false);
            self.playback.send_modify(|view| {
                view.entries.push(PlaybackEntry {
                    consumer_id: consumer_id.clone(),
                    producer_id: consumer.producer_id().clone(),
                    kind,
                    sink: Arc::clone(&sink),
                });
            });

            play_with_fallback(sink.as_ref(), kind, &self.peer_id).await;
            self.resume(consumer_id.clone());

            debug!(
                target: "session.consumer",
                peer_id = %self.peer_id,
                consumer_id = %consumer_id,
                kind = %kind,
                "Consumer attached"
            );
        }
    }

    /// Ask the room to resume a consumer without waiting for the outcome.
    fn resume(&self, consumer_id: ConsumerId) {
        let signaling = self.deps.signaling.clone();
        let cancel = self.cancel_token.clone();
        let peer_id = self.peer_id.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                result = signaling.resume_consumer(consumer_id.clone()) => {
                    if let Err(e) = result {
                        warn!(
                            target: "session.consumer",
                            peer_id = %peer_id,
                            consumer_id = %consumer_id,
                            error = %e,
                            "Resume notification failed"
                        );
                    }
                }
            }
        });
    }

    /// Recover every consumer whose sink is paused or not yet buffered.
    async fn check_playback_health(&mut self) {
        let mut stalled: Vec<MediaKind> = Vec::new();

        for owned in &self.consumers {
            let kind = owned.consumer.kind();
            let Some(sink) = self.sinks.get(&kind) else {
                continue;
            };
            if !sink.is_stalled() {
                continue;
            }

            debug!(
                target: "session.consumer",
                peer_id = %self.peer_id,
                consumer_id = %owned.consumer.id(),
                kind = %kind,
                ready_state = ?sink.ready_state(),
                paused = sink.is_paused(),
                "Playback stalled, attempting recovery"
            );
            metrics::record_playback_recovery(kind.as_str());
            self.resume(owned.consumer.id().clone());

            if !stalled.contains(&kind) {
                stalled.push(kind);
            }
        }

        for kind in stalled {
            if let Some(sink) = self.sinks.get(&kind) {
                if sink.stream().is_some() {
                    self.recovery_attempts += 1;
                    play_with_fallback(sink.as_ref(), kind, &self.peer_id).await;
                }
            }
        }
    }

    /// One-shot check after the first playback attempt.
    async fn settle_check(&self) {
        for (kind, sink) in &self.sinks {
            if sink.is_paused() {
                warn!(
                    target: "session.consumer",
                    peer_id = %self.peer_id,
                    kind = %kind,
                    "Still paused after resume, replaying muted"
                );
                sink.set_muted(true);
                if let Err(e) = sink.play().await {
                    warn!(
                        target: "session.consumer",
                        peer_id = %self.peer_id,
                        kind = %kind,
                        error = %e,
                        "Delayed play attempt failed"
                    );
                }
            }
        }
    }

    fn sink_for(&mut self, kind: MediaKind) -> Arc<dyn MediaSink> {
        let sinks = &self.deps.sinks;
        let peer_id = &self.peer_id;
        Arc::clone(
            self.sinks
                .entry(kind)
                .or_insert_with(|| sinks.create_sink(peer_id, kind)),
        )
    }

    /// Close every consumer and clear every sink.
    fn teardown(&mut self) {
        for owned in self.consumers.drain(..) {
            owned.consumer.close();
        }
        for sink in self.sinks.values() {
            sink.attach(None);
        }
        self.streams.clear();
        self.playback.send_modify(|view| {
            view.active = false;
            view.entries.clear();
        });

        info!(
            target: "session.consumer",
            peer_id = %self.peer_id,
            recovery_attempts = self.recovery_attempts,
            "ConsumerActor stopped"
        );
    }
}

/// Play a sink, retrying once muted if playback is rejected.
async fn play_with_fallback(sink: &dyn MediaSink, kind: MediaKind, peer_id: &PeerId) -> bool {
    let Err(first) = sink.play().await else {
        return true;
    };

    debug!(
        target: "session.consumer",
        peer_id = %peer_id,
        kind = %kind,
        error = %first,
        "Playback rejected, retrying muted"
    );
    metrics::record_muted_fallback(kind.as_str());
    sink.set_muted(true);

    match sink.play().await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                target: "session.consumer",
                peer_id = %peer_id,
                kind = %kind,
                error = %e,
                "Muted playback failed"
            );
            false
        }
    }
}
