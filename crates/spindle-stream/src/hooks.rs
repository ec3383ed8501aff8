// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-invocation callback table, dispatched by the engine alongside the bus.

use crate::bus::{RunEvent, Settled};
use crate::store::Chunk;
use spindle_cancel::AbortReason;
use std::sync::Arc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Optional lifecycle callbacks attached at spawn time.
///
/// Every slot defaults to no-op. The engine dispatches hooks inline as it
/// publishes the matching [`RunEvent`], and never after `end` — the table is
/// effectively detached once the invocation settles.
#[derive(Clone, Default)]
pub struct Hooks {
    on_start: Option<Callback<Option<u32>>>,
    on_stdout: Option<Callback<Chunk>>,
    on_stderr: Option<Callback<Chunk>>,
    on_err: Option<Callback<String>>,
    on_abort: Option<Callback<Option<AbortReason>>>,
    on_end: Option<Callback<Settled>>,
}

impl Hooks {
    /// An empty hook table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the child process has been spawned.
    #[must_use]
    pub fn on_start(mut self, f: impl Fn(&Option<u32>) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Called for every stdout chunk.
    #[must_use]
    pub fn on_stdout(mut self, f: impl Fn(&Chunk) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(f));
        self
    }

    /// Called for every stderr chunk.
    #[must_use]
    pub fn on_stderr(mut self, f: impl Fn(&Chunk) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(f));
        self
    }

    /// Called when a spawn or runtime error is observed.
    #[must_use]
    pub fn on_err(mut self, f: impl Fn(&String) + Send + Sync + 'static) -> Self {
        self.on_err = Some(Arc::new(f));
        self
    }

    /// Called when cancellation is observed.
    #[must_use]
    pub fn on_abort(mut self, f: impl Fn(&Option<AbortReason>) + Send + Sync + 'static) -> Self {
        self.on_abort = Some(Arc::new(f));
        self
    }

    /// Called exactly once, when the invocation settles.
    #[must_use]
    pub fn on_end(mut self, f: impl Fn(&Settled) + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(f));
        self
    }

    /// Route an event to the matching callback, if one is registered.
    pub fn dispatch(&self, event: &RunEvent) {
        match event {
            RunEvent::Start { pid } => {
                if let Some(f) = &self.on_start {
                    f(pid);
                }
            }
            RunEvent::Stdout(chunk) => {
                if let Some(f) = &self.on_stdout {
                    f(chunk);
                }
            }
            RunEvent::Stderr(chunk) => {
                if let Some(f) = &self.on_stderr {
                    f(chunk);
                }
            }
            RunEvent::Err { message } => {
                if let Some(f) = &self.on_err {
                    f(message);
                }
            }
            RunEvent::Abort { reason } => {
                if let Some(f) = &self.on_abort {
                    f(reason);
                }
            }
            RunEvent::End(settled) => {
                if let Some(f) = &self.on_end {
                    f(settled);
                }
            }
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_err", &self.on_err.is_some())
            .field("on_abort", &self.on_abort.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}
