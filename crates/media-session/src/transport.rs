//! Transport management.
//!
//! One send and one receive transport per session. Each carries an explicit
//! connection state machine:
//!
//! ```text
//! new ──► connecting ──► connected
//!  │          │              │
//!  └──────────┴──────────────┴──► failed ──► closed
//!  └──────────┴──────────────┴─────────────► closed
//! ```
//!
//! `failed` is terminal for the transport (no reconnection). `closed`
//! accepts no further transitions.

use crate::capability::CapabilityHandle;
use crate::engine::{EngineTransport, TransportObserver};
use crate::errors::{SignalingError, TransportFailure};
use crate::signaling::Signaling;

use async_trait::async_trait;
use common::protocol::{methods, DtlsParameters};
use common::types::{Direction, MediaKind, ProducerId, TransportId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl TransportState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        }
    }

    /// Transition table.
    #[must_use]
    pub const fn can_transition_to(self, next: TransportState) -> bool {
        use TransportState::{Closed, Connected, Connecting, Failed, New};
        matches!(
            (self, next),
            (New, Connecting | Connected | Failed | Closed)
                | (Connecting, Connected | Failed | Closed)
                | (Connected, Failed | Closed)
                | (Failed, Closed)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed.
    Changed {
        from: TransportState,
        to: TransportState,
    },
    /// Same state reported again.
    Unchanged,
    /// The table does not allow this transition; state kept.
    Rejected {
        from: TransportState,
        to: TransportState,
    },
}

/// A session-owned transport.
pub struct Transport {
    direction: Direction,
    state: TransportState,
    engine: Arc<dyn EngineTransport>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", self.engine.id())
            .field("direction", &self.direction)
            .field("state", &self.state)
            .finish()
    }
}

impl Transport {
    #[must_use]
    pub fn new(direction: Direction, engine: Arc<dyn EngineTransport>) -> Self {
        Self {
            direction,
            state: TransportState::New,
            engine,
        }
    }

    #[must_use]
    pub fn id(&self) -> &TransportId {
        self.engine.id()
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<dyn EngineTransport> {
        &self.engine
    }

    /// Apply a state reported by the engine.
    pub fn apply(&mut self, next: TransportState) -> Transition {
        let from = self.state;
        if from == next {
            return Transition::Unchanged;
        }
        if !from.can_transition_to(next) {
            return Transition::Rejected { from, to: next };
        }
        self.state = next;
        Transition::Changed { from, to: next }
    }

    /// Close the engine transport. Idempotent.
    pub fn close(&mut self) {
        if !self.engine.is_closed() {
            self.engine.close();
        }
        if self.state != TransportState::Closed {
            self.state = TransportState::Closed;
        }
    }
}

/// A connection state reported by one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStateReport {
    pub direction: Direction,
    pub state: TransportState,
}

/// Engine-facing observer that routes the connect/produce handshakes over
/// the signaling channel and reports state changes to the session actor.
///
/// State reports travel on their own unbounded channel so a busy session
/// mailbox never drops a `failed` transition.
pub struct ChannelSignaler {
    direction: Direction,
    transport_id: TransportId,
    signaling: Signaling,
    states: mpsc::UnboundedSender<TransportStateReport>,
}

impl ChannelSignaler {
    #[must_use]
    pub fn new(
        direction: Direction,
        transport_id: TransportId,
        signaling: Signaling,
        states: mpsc::UnboundedSender<TransportStateReport>,
    ) -> Self {
        Self {
            direction,
            transport_id,
            signaling,
            states,
        }
    }
}

#[async_trait]
impl TransportObserver for ChannelSignaler {
    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<(), SignalingError> {
        debug!(
            target: "session.transport",
            direction = %self.direction,
            transport_id = %self.transport_id,
            "Forwarding connect handshake"
        );
        self.signaling
            .connect_transport(self.direction, dtls_parameters)
            .await
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerId, SignalingError> {
        if self.direction != Direction::Send {
            return Err(SignalingError::Rejected {
                method: methods::PRODUCE.to_string(),
                reason: "receive transports cannot produce".to_string(),
            });
        }
        self.signaling
            .produce(self.transport_id.clone(), kind, rtp_parameters)
            .await
    }

    fn connection_state_changed(&self, state: TransportState) {
        let report = TransportStateReport {
            direction: self.direction,
            state,
        };
        if self.states.send(report).is_err() {
            debug!(
                target: "session.transport",
                direction = %self.direction,
                state = %state,
                "Session gone, transport state change ignored"
            );
        }
    }
}

/// Create one transport: fetch parameters, instantiate the engine transport,
/// and wire its observer.
///
/// # Errors
///
/// Returns a `TransportFailure` for `direction` on signaling or engine failure.
#[instrument(skip_all, name = "session.transport.create", fields(direction = %direction))]
pub async fn create_transport(
    signaling: &Signaling,
    capability: &CapabilityHandle,
    direction: Direction,
    states: mpsc::UnboundedSender<TransportStateReport>,
) -> Result<Transport, TransportFailure> {
    let options = signaling
        .create_transport(direction)
        .await
        .map_err(|source| TransportFailure::Signaling { direction, source })?;

    let observer: Arc<dyn TransportObserver> = Arc::new(ChannelSignaler::new(
        direction,
        options.id.clone(),
        signaling.clone(),
        states,
    ));

    let device = capability.device();
    let engine = match direction {
        Direction::Send => device.create_send_transport(options, observer),
        Direction::Receive => device.create_recv_transport(options, observer),
    }
    .map_err(|source| TransportFailure::Engine { direction, source })?;

    info!(
        target: "session.transport",
        direction = %direction,
        transport_id = %engine.id(),
        "Transport created"
    );

    Ok(Transport::new(direction, engine))
}
