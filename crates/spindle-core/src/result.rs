// SPDX-License-Identifier: MIT OR Apache-2.0
//! The immutable settled outcome of one invocation.

use spindle_error::SpawnError;
use spindle_stream::{Channel, ChunkStore};
use std::time::Duration;
use uuid::Uuid;

/// A settled invocation outcome.
///
/// Created exactly once, at termination, and never mutated. The text views
/// read through the invocation's [`ChunkStore`] at access time, so cloning a
/// result is cheap and clones observe the same collected output.
#[derive(Clone)]
pub struct SpawnResult {
    pub(crate) id: Uuid,
    pub(crate) status: Option<i32>,
    pub(crate) signal: Option<String>,
    pub(crate) error: Option<SpawnError>,
    pub(crate) duration: Duration,
    pub(crate) aborted: bool,
    pub(crate) store: ChunkStore,
    pub(crate) origin: String,
}

impl SpawnResult {
    /// The invocation id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Exit status; `None` when the child was signal-terminated or never ran.
    #[must_use]
    pub fn status(&self) -> Option<i32> {
        self.status
    }

    /// Terminating signal name, if any.
    #[must_use]
    pub fn signal(&self) -> Option<&str> {
        self.signal.as_deref()
    }

    /// The classified error, if the invocation failed.
    #[must_use]
    pub fn error(&self) -> Option<&SpawnError> {
        self.error.as_ref()
    }

    /// Wall-clock time from invocation to settlement.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `true` when cancellation was observed before natural completion.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// `true` for a clean, unclassified exit.
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none() && self.status == Some(0)
    }

    /// The collected stdout text.
    #[must_use]
    pub fn stdout(&self) -> String {
        self.store.text(Channel::Stdout)
    }

    /// The collected stderr text.
    #[must_use]
    pub fn stderr(&self) -> String {
        self.store.text(Channel::Stderr)
    }

    /// Both channels interleaved in arrival order.
    #[must_use]
    pub fn stdall(&self) -> String {
        self.store.text(Channel::Stdall)
    }

    /// The collected stdout bytes.
    #[must_use]
    pub fn stdout_bytes(&self) -> Vec<u8> {
        self.store.bytes(Channel::Stdout)
    }

    /// The invocation's chunk store, for replay and fan-out.
    #[must_use]
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// The call-site this invocation originated from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl std::fmt::Display for SpawnResult {
    /// The trimmed combined output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.stdall().trim())
    }
}

impl std::fmt::Debug for SpawnResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnResult")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("signal", &self.signal)
            .field("error", &self.error)
            .field("duration", &self.duration)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}
