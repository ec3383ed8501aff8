// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// AbortReason
// ---------------------------------------------------------------------------

/// Why an invocation was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The caller explicitly asked for cancellation.
    UserRequested,
    /// The timeout watchdog fired.
    Timeout,
    /// Free-form reason supplied by the caller.
    Other(String),
}

impl AbortReason {
    /// Human-readable description of the reason.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::UserRequested => "cancelled by caller".into(),
            Self::Timeout => "cancelled by timeout".into(),
            Self::Other(s) => s.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// A cloneable, cheaply-shareable token used to signal cancellation.
///
/// All clones share the same underlying state; cancelling one immediately
/// makes every clone observe `is_cancelled() == true` and wakes every task
/// suspended in [`cancelled`](CancelToken::cancelled). Only the first
/// recorded [`AbortReason`] is kept.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    reason: Mutex<Option<AbortReason>>,
}

impl CancelToken {
    /// Create a new token that is **not** cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation without a recorded reason. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Signal cancellation with a reason.
    ///
    /// Subsequent calls still signal the token but do not overwrite the
    /// first recorded reason.
    pub fn cancel_with(&self, reason: AbortReason) {
        {
            let mut guard = self.inner.reason.lock().expect("reason lock poisoned");
            if guard.is_none() {
                *guard = Some(reason);
            }
        }
        self.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The recorded abort reason, if any clone supplied one.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.reason.lock().expect("reason lock poisoned").clone()
    }

    /// Wait until cancellation is signalled.
    ///
    /// Resolves immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            self.inner.notify.notified().await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn cancel_flips_state() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clone_shares_state() {
        let a = CancelToken::new();
        let b = a.clone();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn first_reason_wins() {
        let token = CancelToken::new();
        token.cancel_with(AbortReason::Timeout);
        token.cancel_with(AbortReason::UserRequested);
        assert_eq!(token.reason(), Some(AbortReason::Timeout));
    }

    #[test]
    fn plain_cancel_records_no_reason() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.reason().is_none());
        // A later reasoned cancel may still attach the reason.
        token.cancel_with(AbortReason::UserRequested);
        assert_eq!(token.reason(), Some(AbortReason::UserRequested));
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        task.await.expect("waiter should resolve");
    }

    #[test]
    fn serde_roundtrip_for_abort_reason() {
        let reasons = [
            AbortReason::UserRequested,
            AbortReason::Timeout,
            AbortReason::Other("shutting down".into()),
        ];
        for reason in &reasons {
            let json = serde_json::to_string(reason).unwrap();
            let back: AbortReason = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, reason);
        }
    }

    #[test]
    fn descriptions_are_not_empty() {
        assert!(!AbortReason::UserRequested.description().is_empty());
        assert!(!AbortReason::Timeout.description().is_empty());
        assert_eq!(AbortReason::Other("x".into()).description(), "x");
    }
}
