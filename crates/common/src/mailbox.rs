//! Monitored actor mailboxes shared by the session and room actors.
//!
//! `channel` wraps a bounded `mpsc` channel. Every handle send counts as an
//! enqueue and every actor receive as a dequeue, so `depth` is the number of
//! messages waiting in the queue. Depth is published as the
//! `actor_mailbox_depth` gauge.
//!
//! | Actor type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Session    | < 100  | 100-500 | > 500    |
//! | Room       | < 100  | 100-500 | > 500    |
//! | Controller | < 100  | 100-500 | > 500    |

use metrics::gauge;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tracing::{debug, warn};

pub const MAILBOX_NORMAL: usize = 100;
pub const MAILBOX_WARNING: usize = 500;

/// Actor type for log and metric labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// Client-side session actor (one per room membership).
    Session,
    /// Server-side room actor (one per room).
    Room,
    /// Server-side room controller (singleton).
    Controller,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Session => "session",
            ActorType::Room => "room",
            ActorType::Controller => "controller",
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

impl MailboxLevel {
    #[must_use]
    pub const fn for_depth(depth: usize) -> Self {
        if depth > MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth >= MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Queue depth and processed message counts for one actor.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// A sender is about to put a message on the queue.
    fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
        self.publish(depth);

        match MailboxLevel::for_depth(depth) {
            MailboxLevel::Critical => {
                warn!(
                    target: "common.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = depth,
                    "Mailbox depth critical"
                );
            }
            MailboxLevel::Warning if depth == MAILBOX_NORMAL => {
                debug!(
                    target: "common.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
    }

    /// The actor took a message off the queue.
    fn record_dequeue(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.publish(depth);
    }

    fn publish(&self, depth: usize) {
        // Realistic depths are far below f64's exact integer range.
        #[allow(clippy::cast_precision_loss)]
        gauge!("actor_mailbox_depth", "actor_type" => self.actor_type.as_str()).set(depth as f64);
    }

    /// Messages currently waiting in the queue.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        MailboxLevel::for_depth(self.current_depth())
    }
}

/// Create a monitored mailbox with room for `buffer` messages.
#[must_use]
pub fn channel<T>(
    actor_type: ActorType,
    actor_id: impl Into<String>,
    buffer: usize,
) -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (sender, receiver) = mpsc::channel(buffer);
    let monitor = Arc::new(MailboxMonitor::new(actor_type, actor_id));
    (
        MailboxSender {
            inner: sender,
            monitor: Arc::clone(&monitor),
        },
        MailboxReceiver {
            inner: receiver,
            monitor,
        },
    )
}

/// Sending half of a monitored mailbox.
pub struct MailboxSender<T> {
    inner: mpsc::Sender<T>,
    monitor: Arc<MailboxMonitor>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

impl<T> fmt::Debug for MailboxSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl<T> MailboxSender<T> {
    /// Wait for capacity and enqueue `message`.
    ///
    /// # Errors
    ///
    /// Returns the message if the actor has stopped.
    pub async fn send(&self, message: T) -> Result<(), SendError<T>> {
        let Ok(permit) = self.inner.reserve().await else {
            return Err(SendError(message));
        };
        // Counted before the message is visible to the receiver.
        self.monitor.record_enqueue();
        permit.send(message);
        Ok(())
    }

    /// Enqueue `message` without waiting.
    ///
    /// # Errors
    ///
    /// Returns the message if the mailbox is full or the actor has stopped.
    pub fn try_send(&self, message: T) -> Result<(), TrySendError<T>> {
        match self.inner.try_reserve() {
            Ok(permit) => {
                self.monitor.record_enqueue();
                permit.send(message);
                Ok(())
            }
            Err(TrySendError::Full(())) => Err(TrySendError::Full(message)),
            Err(TrySendError::Closed(())) => Err(TrySendError::Closed(message)),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    #[must_use]
    pub fn monitor(&self) -> &MailboxMonitor {
        &self.monitor
    }
}

/// Receiving half of a monitored mailbox, owned by the actor.
pub struct MailboxReceiver<T> {
    inner: mpsc::Receiver<T>,
    monitor: Arc<MailboxMonitor>,
}

impl<T> fmt::Debug for MailboxReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxReceiver")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl<T> MailboxReceiver<T> {
    /// Receive the next message. Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        let message = self.inner.recv().await?;
        self.monitor.record_dequeue();
        Some(message)
    }

    #[must_use]
    pub fn monitor(&self) -> &MailboxMonitor {
        &self.monitor
    }
}
