// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeout watchdog: a single re-armable delayed kill.

use crate::handle::RunningCommand;
use crate::signal::Signal;
use std::time::Duration;
use tracing::debug;

impl RunningCommand {
    /// Arm (or re-arm) the timeout watchdog.
    ///
    /// After `duration` of wall-clock time, an unsettled invocation is
    /// killed with the configured [`timeout signal`](Self::set_timeout_signal).
    /// Re-arming replaces the previously armed timer — timers never stack —
    /// and settlement always disarms, so a completed command never leaves a
    /// live timer behind. Arming after settlement is a no-op.
    pub fn set_timeout(&self, duration: Duration) {
        self.state.disarm_timer();
        if self.is_settled() {
            return;
        }
        let handle = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if handle.is_settled() {
                return;
            }
            let signal = *handle
                .state
                .timeout_signal
                .lock()
                .expect("timeout signal lock poisoned");
            debug!(target: "spindle", id = %handle.id(), %signal, "timeout fired");
            let _ = handle.kill(signal).await;
        });
        *self.state.timer.lock().expect("timer lock poisoned") = Some(timer);
    }

    /// The signal the watchdog will deliver. Default `SIGTERM`.
    ///
    /// Takes effect for the next firing; it does not re-arm the timer.
    pub fn set_timeout_signal(&self, signal: Signal) {
        *self
            .state
            .timeout_signal
            .lock()
            .expect("timeout signal lock poisoned") = signal;
    }

    /// The currently configured timeout signal.
    #[must_use]
    pub fn timeout_signal(&self) -> Signal {
        *self
            .state
            .timeout_signal
            .lock()
            .expect("timeout signal lock poisoned")
    }
}
