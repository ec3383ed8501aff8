// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spawn configuration: caller options, explicit defaults, normalization.

use crate::Signal;
use spindle_cancel::CancelToken;
use spindle_stream::{Channel, ChunkStore, ChunkTap, EventBus, Hooks};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncRead;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StdioMode / StdioPolicy
// ---------------------------------------------------------------------------

/// Per-channel stdio disposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioMode {
    /// Capture through a pipe (the default; feeds the chunk store).
    #[default]
    Piped,
    /// Inherit the parent's descriptor.
    Inherit,
    /// Discard.
    Ignore,
}

impl StdioMode {
    pub(crate) fn to_stdio(self) -> std::process::Stdio {
        match self {
            Self::Piped => std::process::Stdio::piped(),
            Self::Inherit => std::process::Stdio::inherit(),
            Self::Ignore => std::process::Stdio::null(),
        }
    }
}

/// The three-slot stdio policy of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StdioPolicy {
    /// Disposition of the child's stdin.
    pub stdin: StdioMode,
    /// Disposition of the child's stdout.
    pub stdout: StdioMode,
    /// Disposition of the child's stderr.
    pub stderr: StdioMode,
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

/// Which shell, if any, interprets the command line.
///
/// Shell syntax itself is never parsed here — it is delegated to the
/// interpreter the child is spawned with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Shell {
    /// Run the command directly, no shell.
    Off,
    /// The platform default shell (`/bin/sh -c` on Unix, `cmd /d /s /c` on
    /// Windows). The default.
    #[default]
    Default,
    /// A specific interpreter invoked with `-c`.
    Program(PathBuf),
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// The input source fed to the child's stdin.
pub enum Input {
    /// Raw bytes, written then closed.
    Bytes(Vec<u8>),
    /// A byte stream, piped through then closed.
    Reader(Box<dyn AsyncRead + Send + Unpin + 'static>),
    /// Replay-then-live chunks from another invocation's store.
    Tap(ChunkTap),
    /// A late-bound slot, fulfilled by `pipe` before or after the child
    /// starts. If never fulfilled the child sees no input.
    Deferred,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Tap(_) => f.write_str("Tap(..)"),
            Self::Deferred => f.write_str("Deferred"),
        }
    }
}

impl From<Vec<u8>> for Input {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Input {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Bytes(value.into_bytes())
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<&crate::SpawnResult> for Input {
    /// A settled upstream: its buffered stdout, no rerun required.
    fn from(value: &crate::SpawnResult) -> Self {
        Self::Bytes(value.stdout_bytes())
    }
}

impl From<&crate::RunningCommand> for Input {
    /// A pending upstream: replay-then-live stdout chunks.
    fn from(value: &crate::RunningCommand) -> Self {
        Self::Tap(value.store().subscribe(Channel::Stdout))
    }
}

// ---------------------------------------------------------------------------
// SpawnDefaults
// ---------------------------------------------------------------------------

/// Explicit defaults merged under every [`SpawnOptions`].
///
/// Construct once at process start with [`capture`](SpawnDefaults::capture)
/// and pass by reference into each invocation; nothing here is read from
/// ambient global state afterwards.
#[derive(Debug, Clone)]
pub struct SpawnDefaults {
    /// Default working directory.
    pub cwd: PathBuf,
    /// Base environment of spawned children.
    pub env: HashMap<String, String>,
    /// Default shell selection.
    pub shell: Shell,
    /// Whether children get their own process group by default.
    pub detached: bool,
    /// Default stdio policy.
    pub stdio: StdioPolicy,
}

impl SpawnDefaults {
    /// Snapshot the current process's cwd and environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env: std::env::vars().collect(),
            shell: Shell::Default,
            detached: cfg!(unix),
            stdio: StdioPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpawnOptions
// ---------------------------------------------------------------------------

/// Caller-supplied partial configuration for one invocation.
///
/// Unset fields fall back to the [`SpawnDefaults`] at normalization time
/// (rightmost wins). The options value is consumed by the invocation; later
/// changes to whatever it was built from cannot affect an in-flight run.
#[derive(Debug, Default)]
pub struct SpawnOptions {
    /// Command text. Interpreted by the selected shell, or executed directly
    /// when [`Shell::Off`].
    pub cmd: String,
    /// Positional arguments appended after the command.
    pub args: Vec<String>,
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Ordered environment overrides; `None` removes the variable.
    pub env: Vec<(String, Option<String>)>,
    /// Start from an empty environment instead of the defaults snapshot.
    pub env_clear: bool,
    /// Input source for the child's stdin.
    pub input: Option<Input>,
    /// Stdio policy override.
    pub stdio: Option<StdioPolicy>,
    /// Run synchronously (blocking) instead of returning a pending handle.
    pub sync: bool,
    /// Process-group creation override.
    pub detached: Option<bool>,
    /// Shell selection override.
    pub shell: Option<Shell>,
    /// Cancellation token; a fresh one is created when unset.
    pub cancel: Option<CancelToken>,
    /// Lifecycle hook table, auto-attached for the invocation's lifetime.
    pub hooks: Hooks,
    /// Keep a failure classification in `.error` instead of raising it.
    pub nothrow: bool,
    /// Bypass classification, surfacing only raw spawn-level errors.
    pub nohandle: bool,
    /// Arm the timeout watchdog at this duration from spawn.
    pub timeout: Option<Duration>,
    /// Signal the timeout watchdog delivers (default `SIGTERM`).
    pub timeout_signal: Option<Signal>,
}

impl SpawnOptions {
    /// Options for the given command text.
    #[must_use]
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), Some(value.into())));
        self
    }

    /// Remove an environment variable from the child's environment.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env.push((key.into(), None));
        self
    }

    /// Start from an empty environment.
    #[must_use]
    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Feed the child's stdin from the given source.
    #[must_use]
    pub fn input(mut self, input: impl Into<Input>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Reserve a late-bound input slot, fulfilled later by `pipe`.
    #[must_use]
    pub fn deferred_input(mut self) -> Self {
        self.input = Some(Input::Deferred);
        self
    }

    /// Override the stdio policy.
    #[must_use]
    pub fn stdio(mut self, policy: StdioPolicy) -> Self {
        self.stdio = Some(policy);
        self
    }

    /// Select the synchronous (blocking) execution path.
    #[must_use]
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Place the child in its own process group (or not).
    #[must_use]
    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = Some(detached);
        self
    }

    /// Select the shell.
    #[must_use]
    pub fn shell(mut self, shell: Shell) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Use a caller-provided cancellation token.
    #[must_use]
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attach lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Keep failure classifications in `.error` instead of raising them.
    #[must_use]
    pub fn nothrow(mut self, nothrow: bool) -> Self {
        self.nothrow = nothrow;
        self
    }

    /// Bypass classification; only raw spawn-level errors surface.
    #[must_use]
    pub fn nohandle(mut self, nohandle: bool) -> Self {
        self.nohandle = nohandle;
        self
    }

    /// Arm the timeout watchdog at spawn.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Signal delivered when the timeout fires.
    #[must_use]
    pub fn timeout_signal(mut self, signal: Signal) -> Self {
        self.timeout_signal = Some(signal);
        self
    }
}

// ---------------------------------------------------------------------------
// SpawnConfig (normalized)
// ---------------------------------------------------------------------------

/// The normalized, per-invocation configuration consumed by the engine.
#[derive(Debug)]
pub(crate) struct SpawnConfig {
    pub id: Uuid,
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub input: Option<Input>,
    pub stdio: StdioPolicy,
    pub sync: bool,
    pub detached: bool,
    pub shell: Shell,
    pub cancel: CancelToken,
    pub hooks: Hooks,
    pub store: ChunkStore,
    pub bus: EventBus,
    pub nothrow: bool,
    pub nohandle: bool,
    pub timeout: Option<Duration>,
    pub timeout_signal: Signal,
    pub origin: String,
}

/// Merge caller options over the defaults, resolving computed fields now.
pub(crate) fn normalize(
    opts: SpawnOptions,
    defaults: &SpawnDefaults,
    origin: &'static std::panic::Location<'static>,
) -> SpawnConfig {
    let mut env = if opts.env_clear {
        HashMap::new()
    } else {
        defaults.env.clone()
    };
    for (key, value) in opts.env {
        match value {
            Some(v) => {
                env.insert(key, v);
            }
            None => {
                env.remove(&key);
            }
        }
    }

    SpawnConfig {
        id: Uuid::new_v4(),
        cmd: opts.cmd,
        args: opts.args,
        cwd: opts.cwd.unwrap_or_else(|| defaults.cwd.clone()),
        env,
        input: opts.input,
        stdio: opts.stdio.unwrap_or(defaults.stdio),
        sync: opts.sync,
        detached: opts.detached.unwrap_or(defaults.detached),
        shell: opts.shell.unwrap_or_else(|| defaults.shell.clone()),
        cancel: opts.cancel.unwrap_or_default(),
        hooks: opts.hooks,
        store: ChunkStore::new(),
        bus: EventBus::new(),
        nothrow: opts.nothrow,
        nohandle: opts.nohandle,
        timeout: opts.timeout,
        timeout_signal: opts.timeout_signal.unwrap_or_default(),
        origin: format!("{}:{}:{}", origin.file(), origin.line(), origin.column()),
    }
}
