// SPDX-License-Identifier: MIT OR Apache-2.0
//! The not-yet-settled handle over an in-flight invocation.

use crate::config::Input;
use crate::result::SpawnResult;
use crate::signal::Signal;
use futures::future::{BoxFuture, Shared};
use spindle_cancel::CancelToken;
use spindle_error::SpawnError;
use spindle_stream::{Channel, ChunkStore, ChunkTap, EventBus, EventSubscription, Settled};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::process::ChildStdin;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub(crate) type SharedResult = Shared<BoxFuture<'static, Result<SpawnResult, SpawnError>>>;

/// Live, shared state of one asynchronous invocation.
///
/// The designated mutable slots of a running configuration: everything else
/// about the invocation is fixed at normalization time.
pub(crate) struct RunState {
    pub id: Uuid,
    pub store: ChunkStore,
    pub bus: EventBus,
    pub cancel: CancelToken,
    pub detached: AtomicBool,
    pub origin: String,
    pub pid: OnceLock<u32>,
    pub stdin: Mutex<Option<ChildStdin>>,
    pub input_slot: Mutex<Option<oneshot::Sender<Input>>>,
    pub timer: Mutex<Option<JoinHandle<()>>>,
    pub timeout_signal: Mutex<Signal>,
    pub settled: AtomicBool,
    pub summary: OnceLock<Settled>,
}

impl RunState {
    pub(crate) fn disarm_timer(&self) {
        if let Some(timer) = self.timer.lock().expect("timer lock poisoned").take() {
            timer.abort();
        }
    }
}

/// A pending invocation that reads like the result it will become.
///
/// Awaiting the handle (or [`wait`](RunningCommand::wait)) yields the settled
/// [`SpawnResult`]; until then the handle exposes the metadata that never
/// requires settlement — pid, store, event subscriptions, stdin — plus the
/// derived-future field accessors and the kill/abort/timeout/pipe
/// capabilities.
///
/// Cloning shares the underlying invocation, and wrapping a handle into an
/// [`Outcome`] and back never re-intercepts anything: there is exactly one
/// run per handle family, however many copies exist.
#[derive(Clone)]
pub struct RunningCommand {
    pub(crate) state: Arc<RunState>,
    pub(crate) future: SharedResult,
}

impl RunningCommand {
    /// The invocation id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.state.id
    }

    /// The child's OS pid, once spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.state.pid.get().copied()
    }

    /// The invocation's chunk store.
    #[must_use]
    pub fn store(&self) -> ChunkStore {
        self.state.store.clone()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        self.state.bus.subscribe()
    }

    /// Replay-then-live tap of one output channel.
    #[must_use]
    pub fn tap(&self, channel: Channel) -> ChunkTap {
        self.state.store.subscribe(channel)
    }

    /// The shared cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.state.cancel.clone()
    }

    /// Take the child's stdin, when it is piped and not fed by an input
    /// source. Returns `None` before spawn or once taken.
    #[must_use]
    pub fn take_stdin(&self) -> Option<ChildStdin> {
        self.state.stdin.lock().expect("stdin lock poisoned").take()
    }

    /// `true` once the invocation has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state.settled.load(Ordering::SeqCst)
    }

    /// `true` when both handles observe the same invocation.
    #[must_use]
    pub fn same_invocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Await settlement.
    ///
    /// Any number of callers may wait concurrently; all observe the same
    /// outcome. Under the default policy a failure classification resolves
    /// as `Err`; with `nothrow` the result is returned with `.error` set.
    pub async fn wait(&self) -> Result<SpawnResult, SpawnError> {
        self.future.clone().await
    }

    /// Derived future: the settled exit status.
    pub async fn status(&self) -> Result<Option<i32>, SpawnError> {
        Ok(self.wait().await?.status())
    }

    /// Derived future: the settled terminating signal name.
    pub async fn signal(&self) -> Result<Option<String>, SpawnError> {
        Ok(self.wait().await?.signal().map(str::to_owned))
    }

    /// Derived future: the collected stdout text.
    pub async fn output(&self) -> Result<String, SpawnError> {
        Ok(self.wait().await?.stdout())
    }

    /// Derived future: the collected stderr text.
    pub async fn stderr_text(&self) -> Result<String, SpawnError> {
        Ok(self.wait().await?.stderr())
    }

    /// Derived future: both channels interleaved.
    pub async fn stdall(&self) -> Result<String, SpawnError> {
        Ok(self.wait().await?.stdall())
    }

    /// Derived future: wall-clock duration to settlement.
    pub async fn duration(&self) -> Result<std::time::Duration, SpawnError> {
        Ok(self.wait().await?.duration())
    }
}

impl std::future::IntoFuture for RunningCommand {
    type Output = Result<SpawnResult, SpawnError>;
    type IntoFuture = SharedResult;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl std::future::IntoFuture for &RunningCommand {
    type Output = Result<SpawnResult, SpawnError>;
    type IntoFuture = SharedResult;

    fn into_future(self) -> Self::IntoFuture {
        self.future.clone()
    }
}

impl std::fmt::Debug for RunningCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningCommand")
            .field("id", &self.state.id)
            .field("pid", &self.pid())
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A settled-or-pending invocation outcome — the engine's return value and
/// the recognized currency of the composition layer.
#[derive(Debug)]
pub enum Outcome {
    /// The synchronous path's settled result.
    Settled(SpawnResult),
    /// The asynchronous path's pending handle.
    Pending(RunningCommand),
}

impl Outcome {
    /// `true` for [`Outcome::Settled`].
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }

    /// The settled result, if this outcome is settled.
    #[must_use]
    pub fn settled(&self) -> Option<&SpawnResult> {
        match self {
            Self::Settled(r) => Some(r),
            Self::Pending(_) => None,
        }
    }

    /// The pending handle, if this outcome is pending.
    #[must_use]
    pub fn pending(&self) -> Option<&RunningCommand> {
        match self {
            Self::Settled(_) => None,
            Self::Pending(h) => Some(h),
        }
    }

    /// Consume into the settled result, if settled.
    #[must_use]
    pub fn into_settled(self) -> Option<SpawnResult> {
        match self {
            Self::Settled(r) => Some(r),
            Self::Pending(_) => None,
        }
    }

    /// Consume into the pending handle, if pending.
    #[must_use]
    pub fn into_pending(self) -> Option<RunningCommand> {
        match self {
            Self::Settled(_) => None,
            Self::Pending(h) => Some(h),
        }
    }

    /// Await settlement; immediate for an already-settled outcome.
    pub async fn wait(self) -> Result<SpawnResult, SpawnError> {
        match self {
            Self::Settled(r) => Ok(r),
            Self::Pending(h) => h.wait().await,
        }
    }
}

impl From<SpawnResult> for Outcome {
    fn from(value: SpawnResult) -> Self {
        Self::Settled(value)
    }
}

impl From<RunningCommand> for Outcome {
    fn from(value: RunningCommand) -> Self {
        Self::Pending(value)
    }
}
