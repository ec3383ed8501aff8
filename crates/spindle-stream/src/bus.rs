// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broadcast-based lifecycle event bus, one per invocation.

use crate::store::Chunk;
use serde::{Deserialize, Serialize};
use spindle_cancel::AbortReason;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity for the event bus.
const DEFAULT_CAPACITY: usize = 256;

/// Snapshot of a settled outcome carried by [`RunEvent::End`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settled {
    /// Exit status, `None` when the child was signal-terminated or never ran.
    pub status: Option<i32>,
    /// Terminating signal name, if any.
    pub signal: Option<String>,
    /// `true` when cancellation was observed before natural completion.
    pub aborted: bool,
}

/// A lifecycle event of one invocation.
///
/// Ordering guarantees: `Start` precedes any chunk event; `End` is terminal
/// and published exactly once, after every other event of the invocation.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The child process was spawned.
    Start {
        /// OS pid, when the platform reports one.
        pid: Option<u32>,
    },
    /// A stdout chunk was produced.
    Stdout(Chunk),
    /// A stderr chunk was produced.
    Stderr(Chunk),
    /// A spawn or runtime error was observed.
    Err {
        /// Formatted error message.
        message: String,
    },
    /// Cancellation was observed.
    Abort {
        /// Recorded reason, if the canceller supplied one.
        reason: Option<AbortReason>,
    },
    /// The invocation settled.
    End(Settled),
}

impl RunEvent {
    /// `true` for the terminal [`RunEvent::End`] event.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End(_))
    }
}

/// Broadcast bus distributing [`RunEvent`]s to any number of subscribers.
///
/// Owned by exactly one invocation; the engine is the only publisher.
/// Clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published while nobody is subscribed are dropped silently —
    /// the store, not the bus, is the replayable record.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    /// Create a subscription receiving events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A handle for receiving events from an [`EventBus`].
pub struct EventSubscription {
    rx: broadcast::Receiver<RunEvent>,
}

impl EventSubscription {
    /// Receive the next event, waiting asynchronously.
    ///
    /// Returns `None` when the bus is dropped. A lagged subscriber skips
    /// ahead to the oldest retained event.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(target: "spindle.bus", skipped = n, "subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until the terminal [`RunEvent::End`] event, returning its summary.
    ///
    /// Returns `None` if the bus closes before `End` is observed.
    pub async fn wait_end(&mut self) -> Option<Settled> {
        while let Some(ev) = self.recv().await {
            if let RunEvent::End(settled) = ev {
                return Some(settled);
            }
        }
        None
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription").finish_non_exhaustive()
    }
}
