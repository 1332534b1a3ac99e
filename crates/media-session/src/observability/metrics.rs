//! Metrics definitions for the media session.
//!
//! All metrics follow Prometheus naming conventions:
//! - `session_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `direction`: 2 values (send, receive)
//! - `kind`: 2 values (audio, video)
//! - `source`: 3 values (audio, video, screen)
//! - `method`: bounded by protocol methods (~11 values)
//! - `status`: bounded by outcome labels (~6 values)
//!
//! The embedding application installs the recorder; without one every call
//! is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Signaling
// ============================================================================

/// Record a signaling request outcome and latency.
///
/// Metrics: `session_signaling_requests_total`, `session_signaling_request_duration_seconds`
/// Labels: `method`, `status`
pub fn record_signaling_request(method: &str, status: &str, duration: Duration) {
    counter!(
        "session_signaling_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "session_signaling_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

// ============================================================================
// Transports, producers, consumers
// ============================================================================

/// Metric: `session_transport_failures_total`
/// Labels: `direction`
pub fn record_transport_failure(direction: &str) {
    counter!("session_transport_failures_total", "direction" => direction.to_string())
        .increment(1);
}

/// Metric: `session_produce_failures_total`
/// Labels: `source`
pub fn record_produce_failure(source: &str) {
    counter!("session_produce_failures_total", "source" => source.to_string()).increment(1);
}

/// Metric: `session_consume_failures_total`
/// Labels: `kind` (`all` when the consume request itself failed)
pub fn record_consume_failure(kind: &str) {
    counter!("session_consume_failures_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// Playback recovery
// ============================================================================

/// A stalled sink was detected and recovery attempted.
///
/// Metric: `session_playback_recovery_attempts_total`
/// Labels: `kind`
pub fn record_playback_recovery(kind: &str) {
    counter!("session_playback_recovery_attempts_total", "kind" => kind.to_string())
        .increment(1);
}

/// Playback was rejected and retried muted.
///
/// Metric: `session_playback_muted_fallback_total`
/// Labels: `kind`
pub fn record_muted_fallback(kind: &str) {
    counter!("session_playback_muted_fallback_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// Presence and liveness
// ============================================================================

/// Metric: `session_media_state_broadcasts_total`
/// Labels: `kind`, `status`
pub fn record_media_state_broadcast(kind: &str, status: &str) {
    counter!(
        "session_media_state_broadcasts_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Metric: `session_keepalive_pings_total`
/// Labels: `status`
pub fn record_keepalive_ping(status: &str) {
    counter!("session_keepalive_pings_total", "status" => status.to_string()).increment(1);
}

/// Metric: `session_peers_active`
pub fn set_peers_active(count: usize) {
    // usize to f64 conversion is safe for realistic room sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("session_peers_active").set(count as f64);
}

/// Metric: `session_consumer_managers_active`
pub fn set_consumer_managers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("session_consumer_managers_active").set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_signaling_request("join", "success", Duration::from_millis(5));
        record_transport_failure("receive");
        record_produce_failure("screen");
        record_consume_failure("video");
        record_playback_recovery("video");
        record_muted_fallback("audio");
        record_media_state_broadcast("video", "error");
        record_keepalive_ping("success");
        set_peers_active(3);
        set_consumer_managers_active(3);
    }

    #[test]
    fn test_metrics_are_recorded_with_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_transport_failure("receive");
            record_transport_failure("receive");
            record_playback_recovery("video");
            set_peers_active(2);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let find = |name: &str| {
            snapshot
                .iter()
                .find(|(key, _, _, _)| key.key().name() == name)
                .map(|(_, _, _, value)| value.clone())
        };

        assert_eq!(
            find("session_transport_failures_total"),
            Some(&DebugValue::Counter(2))
        );
        assert_eq!(
            find("session_playback_recovery_attempts_total"),
            Some(&DebugValue::Counter(1))
        );
        assert!(matches!(
            find("session_peers_active"),
            Some(DebugValue::Gauge(v)) if (v.into_inner() - 2.0).abs() < f64::EPSILON
        ));
    }
}
