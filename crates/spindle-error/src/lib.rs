// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod tables;

pub use tables::{errno_message, exit_code_info};

// ---------------------------------------------------------------------------
// SpawnErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable, stable tag for a [`SpawnError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpawnErrorKind {
    /// The OS refused or failed to create the process.
    SpawnFailure,
    /// The process ran and exited with a nonzero status.
    NonZeroExit,
    /// The process was terminated by a signal.
    Signaled,
    /// Cancellation was observed before natural completion.
    Aborted,
    /// Caller misuse, e.g. an ineligible pipe target.
    Unsupported,
}

impl std::fmt::Display for SpawnErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SpawnFailure => "spawn_failure",
            Self::NonZeroExit => "non_zero_exit",
            Self::Signaled => "signaled",
            Self::Aborted => "aborted",
            Self::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SpawnError
// ---------------------------------------------------------------------------

/// A settled invocation failure.
///
/// Cloneable so the same settled error can be observed through every handle
/// to an invocation; the spawn-level OS error is shared behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpawnError {
    /// The OS refused or failed to create the process.
    #[error("{message}")]
    Spawn {
        /// Formatted message including errno and origin (see [`format_spawn_message`]).
        message: String,
        /// The underlying OS error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The process exited with a nonzero status code.
    #[error("{message}")]
    NonZeroExit {
        /// The raw exit code.
        code: i32,
        /// Formatted message including the exit-code cause and origin.
        message: String,
    },

    /// The process was terminated by a signal.
    #[error("{message}")]
    Signaled {
        /// Conventional signal name, e.g. `SIGTERM`.
        signal: String,
        /// Formatted message including the signal name and origin.
        message: String,
    },

    /// The invocation was cancelled before natural completion.
    #[error("aborted: {reason}")]
    Aborted {
        /// Description of why the invocation was aborted.
        reason: String,
    },

    /// Caller misuse detected synchronously, outside the settlement channel.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl SpawnError {
    /// Stable machine-readable tag for this error.
    #[must_use]
    pub fn kind(&self) -> SpawnErrorKind {
        match self {
            Self::Spawn { .. } => SpawnErrorKind::SpawnFailure,
            Self::NonZeroExit { .. } => SpawnErrorKind::NonZeroExit,
            Self::Signaled { .. } => SpawnErrorKind::Signaled,
            Self::Aborted { .. } => SpawnErrorKind::Aborted,
            Self::Unsupported(_) => SpawnErrorKind::Unsupported,
        }
    }

    /// The exit code, for [`SpawnError::NonZeroExit`].
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The terminating signal name, for [`SpawnError::Signaled`].
    #[must_use]
    pub fn signal(&self) -> Option<&str> {
        match self {
            Self::Signaled { signal, .. } => Some(signal),
            _ => None,
        }
    }

    /// `true` when the process never started.
    #[must_use]
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    /// Build a [`SpawnError::Spawn`] from an OS error and origin call-site.
    #[must_use]
    pub fn spawn(source: std::io::Error, origin: &str) -> Self {
        let message = format_spawn_message(&source, origin);
        Self::Spawn {
            message,
            source: Arc::new(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Message formatting
// ---------------------------------------------------------------------------

/// Format the failure message for an exit-status classification.
///
/// For a clean `exit code: 0` outcome the message is just that; any nonzero
/// code or signal produces the diagnostic block embedding the collected
/// stderr tail, the origin call-site, the exit code with its documented
/// cause (when known), and the signal name (when present).
#[must_use]
pub fn format_exit_message(
    code: Option<i32>,
    signal: Option<&str>,
    stderr: &str,
    origin: &str,
) -> String {
    let code_repr = code.map_or_else(|| "null".to_string(), |c| c.to_string());
    if code == Some(0) && signal.is_none() {
        return format!("exit code: {code_repr}");
    }

    let head = if stderr.is_empty() { "\n" } else { stderr };
    let mut message = format!("{head}    at {origin}");
    match code.and_then(exit_code_info) {
        Some(info) => message.push_str(&format!("\n    exit code: {code_repr} ({info})")),
        None => message.push_str(&format!("\n    exit code: {code_repr}")),
    }
    if let Some(signal) = signal {
        message.push_str(&format!("\n    signal: {signal}"));
    }
    message
}

/// Format the failure message for a spawn-level OS error.
///
/// Surfaces the OS error text, the raw errno with its human-readable
/// mapping, the `std::io::ErrorKind`, and the origin call-site.
#[must_use]
pub fn format_spawn_message(err: &std::io::Error, origin: &str) -> String {
    let errno = err.raw_os_error();
    let errno_repr = errno.map_or_else(|| "null".to_string(), |e| e.to_string());
    let mapped = errno.map_or("Unknown error", errno_message);
    format!(
        "{err}\n    errno: {errno_repr} ({mapped})\n    code: {kind:?}\n    at {origin}",
        kind = err.kind()
    )
}
