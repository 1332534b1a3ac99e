//! Media-state broadcaster.
//!
//! Sends `mediaStateChanged` after a local toggle. Best effort: a missed
//! broadcast is corrected by the next toggle.

use crate::observability::metrics;
use crate::signaling::Signaling;

use common::types::MediaKind;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct MediaStateBroadcaster {
    signaling: Signaling,
}

impl MediaStateBroadcaster {
    #[must_use]
    pub fn new(signaling: Signaling) -> Self {
        Self { signaling }
    }

    /// Announce a local flag. Returns whether the notification was handed
    /// to the channel. Never retries.
    pub async fn broadcast(&self, kind: MediaKind, enabled: bool) -> bool {
        match self.signaling.media_state_changed(kind, enabled).await {
            Ok(()) => {
                debug!(
                    target: "session.producer",
                    kind = %kind,
                    enabled = enabled,
                    "Media state broadcast"
                );
                metrics::record_media_state_broadcast(kind.as_str(), "success");
                true
            }
            Err(e) => {
                warn!(
                    target: "session.producer",
                    kind = %kind,
                    enabled = enabled,
                    error = %e,
                    "Media state broadcast failed"
                );
                metrics::record_media_state_broadcast(kind.as_str(), "error");
                false
            }
        }
    }
}
