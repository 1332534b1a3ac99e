//! Liveness keeper.
//!
//! Keeps a near-silent audio signal running for the whole session and, while
//! the host page is hidden, sends a `ping` on a fixed interval. Becoming
//! hidden triggers an immediate ping and resumes the audio context
//! (reactive keep-alive). Nothing is sent while visible. Failures are logged
//! and never escalated.

use crate::actors::messages::Visibility;
use crate::media::KeepAliveAudio;
use crate::observability::metrics;
use crate::signaling::Signaling;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub struct LivenessKeeper {
    signaling: Signaling,
    audio: Arc<dyn KeepAliveAudio>,
    interval: Duration,
    gain: f32,
    visibility: watch::Receiver<Visibility>,
    cancel_token: CancellationToken,
    pings_sent: u64,
}

impl LivenessKeeper {
    /// Spawn the keeper task. It runs until `cancel_token` is cancelled.
    pub fn spawn(
        signaling: Signaling,
        audio: Arc<dyn KeepAliveAudio>,
        interval: Duration,
        gain: f32,
        visibility: watch::Receiver<Visibility>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let keeper = Self {
            signaling,
            audio,
            interval,
            gain,
            visibility,
            cancel_token,
            pings_sent: 0,
        };
        tokio::spawn(keeper.run())
    }

    #[instrument(skip_all, name = "session.liveness")]
    async fn run(mut self) {
        if let Err(e) = self.audio.start(self.gain).await {
            warn!(
                target: "session.liveness",
                error = %e,
                "Keep-alive audio failed to start"
            );
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watching = true;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,

                _ = ticker.tick() => {
                    let hidden = self.visibility.borrow().is_hidden();
                    if hidden {
                        self.ping("interval").await;
                    }
                }

                changed = self.visibility.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let hidden = self.visibility.borrow_and_update().is_hidden();
                    if hidden {
                        debug!(target: "session.liveness", "Page hidden");
                        self.ping("visibility").await;
                        if let Err(e) = self.audio.resume().await {
                            warn!(
                                target: "session.liveness",
                                error = %e,
                                "Keep-alive audio resume failed"
                            );
                        }
                    }
                }
            }
        }

        self.audio.stop();
        info!(
            target: "session.liveness",
            pings_sent = self.pings_sent,
            "Liveness keeper stopped"
        );
    }

    async fn ping(&mut self, trigger: &'static str) {
        match self.signaling.ping().await {
            Ok(()) => {
                self.pings_sent += 1;
                metrics::record_keepalive_ping("success");
                debug!(target: "session.liveness", trigger = trigger, "Keep-alive ping sent");
            }
            Err(e) => {
                metrics::record_keepalive_ping("error");
                warn!(
                    target: "session.liveness",
                    trigger = trigger,
                    error = %e,
                    "Keep-alive ping failed"
                );
            }
        }
    }
}
