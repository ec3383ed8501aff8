// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipe composition: one invocation's output becomes another's input.

use crate::config::{Input, SpawnDefaults, SpawnOptions};
use crate::handle::{Outcome, RunningCommand};
use crate::result::SpawnResult;
use spindle_error::SpawnError;
use spindle_stream::{Channel, ChunkTap};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

/// A recognized pipe destination.
pub enum PipeTarget {
    /// A new command description; a downstream invocation is spawned with
    /// its input pointed at the source's output.
    Command(SpawnOptions),
    /// An existing pending handle created with a deferred-input slot.
    Handle(RunningCommand),
    /// A raw output sink.
    Writer(Box<dyn AsyncWrite + Send + Unpin + 'static>),
}

impl std::fmt::Debug for PipeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(opts) => f.debug_tuple("Command").field(&opts.cmd).finish(),
            Self::Handle(h) => f.debug_tuple("Handle").field(&h.id()).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl From<SpawnOptions> for PipeTarget {
    fn from(value: SpawnOptions) -> Self {
        Self::Command(value)
    }
}

impl From<&str> for PipeTarget {
    fn from(value: &str) -> Self {
        Self::Command(SpawnOptions::new(value))
    }
}

impl From<RunningCommand> for PipeTarget {
    fn from(value: RunningCommand) -> Self {
        Self::Handle(value)
    }
}

impl From<Box<dyn AsyncWrite + Send + Unpin + 'static>> for PipeTarget {
    fn from(value: Box<dyn AsyncWrite + Send + Unpin + 'static>) -> Self {
        Self::Writer(value)
    }
}

impl RunningCommand {
    /// Pipe this invocation's stdout into `target`.
    ///
    /// The target receives the complete output via replay-then-subscribe:
    /// everything already buffered first, then live chunks. Each `pipe` call
    /// taps the store independently, so concurrent consumers fan out without
    /// splitting the stream.
    ///
    /// A command target spawns asynchronously (the source is still pending).
    /// A writer target copies in a background task and yields the source
    /// outcome back for chaining.
    ///
    /// # Errors
    ///
    /// [`SpawnError::Unsupported`] when the target handle has no open
    /// deferred-input slot — that is a programming error, surfaced
    /// synchronously rather than through settlement.
    #[track_caller]
    pub fn pipe(
        &self,
        target: impl Into<PipeTarget>,
        defaults: &SpawnDefaults,
    ) -> Result<Outcome, SpawnError> {
        match target.into() {
            PipeTarget::Command(mut opts) => {
                opts.input = Some(Input::Tap(self.tap(Channel::Stdout)));
                opts.sync = false;
                crate::invoke(opts, defaults)
            }
            PipeTarget::Handle(handle) => {
                bind_late_input(&handle, Input::Tap(self.tap(Channel::Stdout)))?;
                Ok(Outcome::Pending(handle))
            }
            PipeTarget::Writer(writer) => {
                drain_into(self.tap(Channel::Stdout), writer);
                Ok(Outcome::Pending(self.clone()))
            }
        }
    }

    /// Pipe stdout into a raw sink, returning the copy task.
    ///
    /// The task completes once the source settles and the backlog is
    /// flushed.
    pub fn pipe_writer(
        &self,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> JoinHandle<std::io::Result<()>> {
        drain_into(self.tap(Channel::Stdout), Box::new(writer))
    }
}

impl SpawnResult {
    /// Pipe this settled invocation's output into `target`.
    ///
    /// The buffered stdout is replayed in full; a command target runs
    /// synchronously, inheriting the settledness of its source.
    ///
    /// # Errors
    ///
    /// [`SpawnError::Unsupported`] for a handle target without an open
    /// deferred-input slot, and any classified failure of a synchronously
    /// spawned downstream command.
    #[track_caller]
    pub fn pipe(
        &self,
        target: impl Into<PipeTarget>,
        defaults: &SpawnDefaults,
    ) -> Result<Outcome, SpawnError> {
        match target.into() {
            PipeTarget::Command(mut opts) => {
                opts.input = Some(Input::Bytes(self.stdout_bytes()));
                opts.sync = true;
                crate::invoke(opts, defaults)
            }
            PipeTarget::Handle(handle) => {
                bind_late_input(&handle, Input::Bytes(self.stdout_bytes()))?;
                Ok(Outcome::Pending(handle))
            }
            PipeTarget::Writer(writer) => {
                drain_into(self.store().subscribe(Channel::Stdout), writer);
                Ok(Outcome::Settled(self.clone()))
            }
        }
    }
}

impl Outcome {
    /// Pipe the outcome's output into `target`, settled or pending alike.
    ///
    /// # Errors
    ///
    /// See [`RunningCommand::pipe`] and [`SpawnResult::pipe`].
    #[track_caller]
    pub fn pipe(
        &self,
        target: impl Into<PipeTarget>,
        defaults: &SpawnDefaults,
    ) -> Result<Outcome, SpawnError> {
        match self {
            Self::Settled(result) => result.pipe(target, defaults),
            Self::Pending(handle) => handle.pipe(target, defaults),
        }
    }
}

fn bind_late_input(handle: &RunningCommand, input: Input) -> Result<(), SpawnError> {
    let sender = handle
        .state
        .input_slot
        .lock()
        .expect("input slot lock poisoned")
        .take();
    match sender {
        Some(tx) => {
            let _ = tx.send(input);
            Ok(())
        }
        None => Err(SpawnError::Unsupported(
            "pipe target does not accept late input".into(),
        )),
    }
}

fn drain_into(
    mut tap: ChunkTap,
    mut writer: Box<dyn AsyncWrite + Send + Unpin + 'static>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        while let Some(chunk) = tap.next().await {
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        Ok(())
    })
}
