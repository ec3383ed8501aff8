// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kill and abort: signal a running child and observe its actual exit.

use crate::handle::RunningCommand;
use crate::signal::Signal;
use spindle_cancel::AbortReason;
use spindle_error::SpawnError;
use spindle_stream::{RunEvent, Settled};
use std::sync::atomic::Ordering;
use tracing::debug;

impl RunningCommand {
    /// Signal the child (default `SIGTERM`) and resolve once it has
    /// actually exited.
    ///
    /// Detached children are signalled as a process group first, falling
    /// back to the child itself. The returned summary is the settled
    /// outcome observed after the signal — not an assumption of immediate
    /// death. Killing an already-settled invocation returns its summary
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`SpawnError::Unsupported`] when no child process was ever spawned;
    /// a spawn-level error when the OS rejects the signal for a child that
    /// has not settled.
    pub async fn kill(&self, signal: impl Into<Option<Signal>>) -> Result<Settled, SpawnError> {
        let signal = signal.into().unwrap_or_default();
        if let Some(summary) = self.state.summary.get() {
            return Ok(summary.clone());
        }
        let Some(pid) = self.pid() else {
            return Err(SpawnError::Unsupported("no child process to kill".into()));
        };

        let mut sub = self.subscribe();
        // The invocation may have settled between the check above and the
        // subscription; the summary is recorded before `end` is published.
        if let Some(summary) = self.state.summary.get() {
            return Ok(summary.clone());
        }

        debug!(target: "spindle", id = %self.id(), %signal, pid, "killing");
        let detached = self.state.detached.load(Ordering::SeqCst);
        if let Err(err) = signal_pid(pid, signal, detached) {
            if let Some(summary) = self.state.summary.get() {
                // Lost the race against a natural exit; that is a no-op.
                return Ok(summary.clone());
            }
            return Err(SpawnError::spawn(err, &self.state.origin));
        }

        loop {
            match sub.recv().await {
                Some(RunEvent::End(summary)) => return Ok(summary),
                Some(_) => continue,
                None => break,
            }
        }
        self.state.summary.get().cloned().ok_or_else(|| SpawnError::Aborted {
            reason: "invocation ended without settlement".into(),
        })
    }

    /// Trigger the shared cancellation token.
    ///
    /// Cancellation observed after the child has exited is a no-op.
    pub fn abort(&self, reason: Option<AbortReason>) {
        self.state
            .cancel
            .cancel_with(reason.unwrap_or(AbortReason::UserRequested));
    }
}

/// Deliver `signal` to the child, group-first when detached.
///
/// The two-step dispatch is explicit: a detached child gets the negative
/// process-group id, and only on failure is the child signalled directly.
#[cfg(unix)]
#[allow(unsafe_code)]
pub(crate) fn signal_pid(pid: u32, signal: Signal, detached: bool) -> std::io::Result<()> {
    let pid = i32::try_from(pid).map_err(|_| std::io::Error::other("pid out of range"))?;
    // SAFETY: kill(2) with validated arguments; no memory is handed to the OS.
    if detached && unsafe { libc::kill(-pid, signal.number()) } == 0 {
        return Ok(());
    }
    if unsafe { libc::kill(pid, signal.number()) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_pid(_pid: u32, _signal: Signal, _detached: bool) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signal dispatch is only available on unix",
    ))
}
