// SPDX-License-Identifier: MIT OR Apache-2.0
//! The invocation state machine: blocking and task-driven spawn paths.
//!
//! Both paths share the same shape: build the OS command from the normalized
//! configuration, spawn, wire the child's streams into the chunk store and
//! event bus, and reduce the outcome into a [`SpawnResult`]. Every failure
//! mode settles — a caller is never left without a terminal `end` event.

use crate::config::{Input, Shell, SpawnConfig, SpawnDefaults, SpawnOptions, normalize};
use crate::handle::{Outcome, RunState, RunningCommand, SharedResult};
use crate::result::SpawnResult;
use crate::signal::Signal;
use futures::FutureExt;
use spindle_cancel::CancelToken;
use spindle_error::{SpawnError, format_exit_message};
use spindle_stream::{ChunkStore, EventBus, Hooks, RunEvent, Settled, to_chunk};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run one invocation, dispatching on its `sync` flag.
///
/// The synchronous path blocks until the child exits and returns the settled
/// outcome (or the classified error, under the default policy). The
/// asynchronous path returns a pending [`RunningCommand`] immediately and
/// must be called within a tokio runtime.
///
/// # Errors
///
/// Synchronous invocations return the classified failure unless `nothrow`
/// is set; fail-fast misuse (e.g. a streaming input on the blocking path)
/// surfaces as [`SpawnError::Unsupported`].
#[track_caller]
pub fn invoke(opts: SpawnOptions, defaults: &SpawnDefaults) -> Result<Outcome, SpawnError> {
    let origin = std::panic::Location::caller();
    let cfg = normalize(opts, defaults, origin);
    if cfg.sync {
        invoke_sync(cfg).map(Outcome::Settled)
    } else {
        Ok(Outcome::Pending(invoke_async(cfg)))
    }
}

/// Start an asynchronous invocation, returning its pending handle.
///
/// Must be called within a tokio runtime.
#[track_caller]
pub fn spawn(mut opts: SpawnOptions, defaults: &SpawnDefaults) -> RunningCommand {
    opts.sync = false;
    let cfg = normalize(opts, defaults, std::panic::Location::caller());
    invoke_async(cfg)
}

/// Run a blocking invocation to completion on the calling thread.
///
/// # Errors
///
/// Returns the classified failure unless `nothrow` is set.
#[track_caller]
pub fn spawn_blocking(mut opts: SpawnOptions, defaults: &SpawnDefaults) -> Result<SpawnResult, SpawnError> {
    opts.sync = true;
    let cfg = normalize(opts, defaults, std::panic::Location::caller());
    invoke_sync(cfg)
}

/// Start an invocation whose options are themselves still pending.
///
/// The handle exists immediately — listeners, timeout, abort, and pipe all
/// work before the command is known — and the OS spawn is postponed until
/// `opts` resolves. Input may be bound via `pipe` up to the moment of the
/// actual spawn.
#[track_caller]
pub fn spawn_deferred<F>(opts: F, defaults: &SpawnDefaults) -> RunningCommand
where
    F: std::future::Future<Output = SpawnOptions> + Send + 'static,
{
    let origin = std::panic::Location::caller();
    let started = Instant::now();
    let defaults = defaults.clone();

    let (settle_tx, settle_rx) = oneshot::channel();
    let (input_tx, mut input_rx) = oneshot::channel::<Input>();
    let state = Arc::new(RunState {
        id: Uuid::new_v4(),
        store: ChunkStore::new(),
        bus: EventBus::new(),
        cancel: CancelToken::new(),
        detached: AtomicBool::new(defaults.detached),
        origin: format!("{}:{}:{}", origin.file(), origin.line(), origin.column()),
        pid: OnceLock::new(),
        stdin: Mutex::new(None),
        input_slot: Mutex::new(Some(input_tx)),
        timer: Mutex::new(None),
        timeout_signal: Mutex::new(Signal::Term),
        settled: AtomicBool::new(false),
        summary: OnceLock::new(),
    });
    let handle = RunningCommand {
        state: Arc::clone(&state),
        future: shared_settlement(settle_rx),
    };

    let task_handle = handle.clone();
    tokio::spawn(async move {
        let resolved = opts.await;
        if let Some(token) = &resolved.cancel {
            bridge_cancel(token.clone(), state.cancel.clone());
        }
        let mut cfg = normalize(resolved, &defaults, origin);
        cfg.sync = false;
        cfg.id = state.id;
        cfg.origin = state.origin.clone();
        cfg.store = state.store.clone();
        cfg.bus = state.bus.clone();
        cfg.cancel = state.cancel.clone();
        state.detached.store(cfg.detached, Ordering::SeqCst);
        *state.timeout_signal.lock().expect("timeout lock poisoned") = cfg.timeout_signal;
        if let Some(duration) = cfg.timeout.take() {
            task_handle.set_timeout(duration);
        }

        // Late-bound input: prefer what the options resolved to; otherwise
        // accept an input piped in while the command was still pending. With
        // neither, stdin is fed nothing and closed so the child sees
        // end-of-input.
        let input_rx = if matches!(cfg.input, Some(Input::Deferred)) {
            Some(input_rx)
        } else {
            if cfg.input.is_none() {
                cfg.input = Some(match input_rx.try_recv() {
                    Ok(early) => early,
                    Err(_) => Input::Bytes(Vec::new()),
                });
            }
            state.input_slot.lock().expect("input slot lock poisoned").take();
            None
        };

        drive(cfg, state, settle_tx, input_rx, started).await;
    });

    handle
}

// ---------------------------------------------------------------------------
// Asynchronous path
// ---------------------------------------------------------------------------

pub(crate) fn invoke_async(mut cfg: SpawnConfig) -> RunningCommand {
    let started = Instant::now();
    let (settle_tx, settle_rx) = oneshot::channel();

    let (input_slot, input_rx) = if matches!(cfg.input, Some(Input::Deferred)) {
        let (tx, rx) = oneshot::channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let state = Arc::new(RunState {
        id: cfg.id,
        store: cfg.store.clone(),
        bus: cfg.bus.clone(),
        cancel: cfg.cancel.clone(),
        detached: AtomicBool::new(cfg.detached),
        origin: cfg.origin.clone(),
        pid: OnceLock::new(),
        stdin: Mutex::new(None),
        input_slot: Mutex::new(input_slot),
        timer: Mutex::new(None),
        timeout_signal: Mutex::new(cfg.timeout_signal),
        settled: AtomicBool::new(false),
        summary: OnceLock::new(),
    });
    let handle = RunningCommand {
        state: Arc::clone(&state),
        future: shared_settlement(settle_rx),
    };

    let timeout = cfg.timeout.take();
    tokio::spawn(drive(cfg, Arc::clone(&state), settle_tx, input_rx, started));
    if let Some(duration) = timeout {
        handle.set_timeout(duration);
    }
    handle
}

fn shared_settlement(rx: oneshot::Receiver<Result<SpawnResult, SpawnError>>) -> SharedResult {
    async move {
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SpawnError::Aborted {
                reason: "invocation task dropped before settlement".into(),
            }),
        }
    }
    .boxed()
    .shared()
}

fn bridge_cancel(source: CancelToken, target: CancelToken) {
    tokio::spawn(async move {
        source.cancelled().await;
        match source.reason() {
            Some(reason) => target.cancel_with(reason),
            None => target.cancel(),
        }
    });
}

async fn drive(
    mut cfg: SpawnConfig,
    state: Arc<RunState>,
    settle: oneshot::Sender<Result<SpawnResult, SpawnError>>,
    input_rx: Option<oneshot::Receiver<Input>>,
    started: Instant,
) {
    let bus = cfg.bus.clone();
    let hooks = cfg.hooks.clone();
    let store = cfg.store.clone();

    let mut command = tokio::process::Command::from(build_command(&cfg));
    command.kill_on_drop(false);

    debug!(target: "spindle", id = %cfg.id, cmd = %cfg.cmd, "spawning");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let raw = SpawnError::spawn(err, &cfg.origin);
            emit(&bus, &hooks, RunEvent::Err { message: raw.to_string() });
            settle_now(&cfg, &state, settle, started, None, None, false, Some(raw));
            return;
        }
    };

    if let Some(pid) = child.id() {
        let _ = state.pid.set(pid);
    }
    emit(&bus, &hooks, RunEvent::Start { pid: child.id() });

    match (cfg.input.take(), child.stdin.take()) {
        (None, Some(stdin)) => {
            // Left open for the caller via take_stdin().
            *state.stdin.lock().expect("stdin lock poisoned") = Some(stdin);
        }
        (None, None) => {}
        (Some(input), Some(stdin)) => {
            tokio::spawn(write_input(input, input_rx, stdin));
        }
        (Some(_), None) => {
            warn!(target: "spindle", id = %cfg.id, "input provided but stdin is not piped");
        }
    }

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump_stream(
            stdout,
            store.clone(),
            bus.clone(),
            hooks.clone(),
            true,
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump_stream(
            stderr,
            store.clone(),
            bus.clone(),
            hooks.clone(),
            false,
        )));
    }

    let cancel = cfg.cancel.clone();
    let mut aborted = false;
    let mut wait_error = None;
    let status = loop {
        tokio::select! {
            _ = cancel.cancelled(), if !aborted => {
                aborted = true;
                deliver_cancel_signal(&state, &mut child);
                emit(&bus, &hooks, RunEvent::Abort { reason: cancel.reason() });
            }
            exit = child.wait() => match exit {
                Ok(status) => break Some(status),
                Err(err) => {
                    let raw = SpawnError::spawn(err, &cfg.origin);
                    emit(&bus, &hooks, RunEvent::Err { message: raw.to_string() });
                    wait_error = Some(raw);
                    break None;
                }
            },
        }
    };

    if aborted {
        // The cancelled child may never flush; do not wait on its streams.
        for reader in &readers {
            reader.abort();
        }
    }
    for reader in readers {
        let _ = reader.await;
    }

    let (code, signal) = match &status {
        Some(status) => (status.code(), exit_signal(status)),
        None => (None, None),
    };
    settle_now(&cfg, &state, settle, started, code, signal, aborted, wait_error);
}

async fn write_input(input: Input, input_rx: Option<oneshot::Receiver<Input>>, mut stdin: ChildStdin) {
    let resolved = match input {
        Input::Deferred => match input_rx {
            Some(rx) => rx.await.ok(),
            None => None,
        },
        other => Some(other),
    };
    let Some(resolved) = resolved else {
        // Slot dropped without a binding: close stdin by dropping it.
        return;
    };

    let outcome = match resolved {
        Input::Bytes(bytes) => stdin.write_all(&bytes).await,
        Input::Reader(mut reader) => tokio::io::copy(&mut reader, &mut stdin).await.map(|_| ()),
        Input::Tap(mut tap) => {
            let mut res = Ok(());
            while let Some(chunk) = tap.next().await {
                if let Err(err) = stdin.write_all(&chunk).await {
                    res = Err(err);
                    break;
                }
            }
            res
        }
        Input::Deferred => Ok(()),
    };
    if let Err(err) = outcome {
        // Common when the child exits before consuming its input.
        warn!(target: "spindle", error = %err, "stdin write failed");
    }
    let _ = stdin.shutdown().await;
}

async fn pump_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    store: ChunkStore,
    bus: EventBus,
    hooks: Hooks,
    is_stdout: bool,
) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = to_chunk(&buf[..n]);
                if is_stdout {
                    store.push_stdout(Arc::clone(&chunk));
                    emit(&bus, &hooks, RunEvent::Stdout(chunk));
                } else {
                    store.push_stderr(Arc::clone(&chunk));
                    emit(&bus, &hooks, RunEvent::Stderr(chunk));
                }
            }
            Err(err) => {
                warn!(target: "spindle", error = %err, "stream read failed");
                break;
            }
        }
    }
}

fn deliver_cancel_signal(state: &RunState, child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = state.pid.get().copied() {
            let detached = state.detached.load(Ordering::SeqCst);
            if let Err(err) = crate::caps::signal_pid(pid, Signal::Term, detached) {
                warn!(target: "spindle", error = %err, "cancel signal failed, killing child directly");
                let _ = child.start_kill();
            }
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = state;
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(Signal::name_of)
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<String> {
    None
}

/// Build the settled result, classify it, and fire the terminal events.
///
/// This is the single settlement seam of the async path: the timer is
/// disarmed, the store closed, the summary recorded, the waiters resolved,
/// and `end` published — in that order, exactly once.
#[allow(clippy::too_many_arguments)]
fn settle_now(
    cfg: &SpawnConfig,
    state: &RunState,
    settle: oneshot::Sender<Result<SpawnResult, SpawnError>>,
    started: Instant,
    status: Option<i32>,
    signal: Option<String>,
    aborted: bool,
    raw: Option<SpawnError>,
) {
    state.disarm_timer();
    state.settled.store(true, Ordering::SeqCst);
    cfg.store.close();

    let result = SpawnResult {
        id: cfg.id,
        status,
        signal,
        error: None,
        duration: started.elapsed(),
        aborted,
        store: cfg.store.clone(),
        origin: cfg.origin.clone(),
    };
    let (result, raise) = finalize(result, raw, cfg.nothrow, cfg.nohandle);

    let summary = Settled {
        status: result.status,
        signal: result.signal.clone(),
        aborted,
    };
    let _ = state.summary.set(summary.clone());
    let _ = settle.send(match raise {
        Some(err) => Err(err),
        None => Ok(result),
    });
    emit(&cfg.bus, &cfg.hooks, RunEvent::End(summary));
}

// ---------------------------------------------------------------------------
// Synchronous path
// ---------------------------------------------------------------------------

pub(crate) fn invoke_sync(mut cfg: SpawnConfig) -> Result<SpawnResult, SpawnError> {
    let started = Instant::now();
    let bus = cfg.bus.clone();
    let hooks = cfg.hooks.clone();
    let store = cfg.store.clone();

    // Streaming inputs need the task-driven path; reject before spawning.
    match &cfg.input {
        Some(Input::Reader(_)) => {
            return Err(SpawnError::Unsupported(
                "streaming input requires an asynchronous invocation".into(),
            ));
        }
        Some(Input::Deferred) => {
            return Err(SpawnError::Unsupported(
                "deferred input requires an asynchronous invocation".into(),
            ));
        }
        _ => {}
    }

    debug!(target: "spindle", id = %cfg.id, cmd = %cfg.cmd, "spawning (blocking)");
    let mut child = match build_command(&cfg).spawn() {
        Ok(child) => child,
        Err(err) => {
            let raw = SpawnError::spawn(err, &cfg.origin);
            emit(&bus, &hooks, RunEvent::Err { message: raw.to_string() });
            return settle_sync(&cfg, started, None, None, Some(raw));
        }
    };
    emit(&bus, &hooks, RunEvent::Start { pid: Some(child.id()) });

    if let Some(mut stdin) = child.stdin.take() {
        let write = match cfg.input.take() {
            Some(Input::Bytes(bytes)) => stdin.write_all(&bytes),
            Some(Input::Tap(mut tap)) => {
                // A settled upstream's tap is fully buffered by now.
                let mut res = Ok(());
                for chunk in tap.drain_now() {
                    if let Err(err) = stdin.write_all(&chunk) {
                        res = Err(err);
                        break;
                    }
                }
                res
            }
            _ => Ok(()),
        };
        if let Err(err) = write {
            warn!(target: "spindle", error = %err, "stdin write failed");
        }
        // Dropping the handle closes the child's stdin.
    }

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(err) => {
            let raw = SpawnError::spawn(err, &cfg.origin);
            emit(&bus, &hooks, RunEvent::Err { message: raw.to_string() });
            return settle_sync(&cfg, started, None, None, Some(raw));
        }
    };

    if !output.stdout.is_empty() {
        let chunk = to_chunk(&output.stdout);
        store.push_stdout(Arc::clone(&chunk));
        emit(&bus, &hooks, RunEvent::Stdout(chunk));
    }
    if !output.stderr.is_empty() {
        let chunk = to_chunk(&output.stderr);
        store.push_stderr(Arc::clone(&chunk));
        emit(&bus, &hooks, RunEvent::Stderr(chunk));
    }

    let code = output.status.code();
    let signal = exit_signal(&output.status);
    settle_sync(&cfg, started, code, signal, None)
}

/// The synchronous settlement seam: close, classify, publish `end`, and
/// apply the throw-vs-return policy.
fn settle_sync(
    cfg: &SpawnConfig,
    started: Instant,
    status: Option<i32>,
    signal: Option<String>,
    raw: Option<SpawnError>,
) -> Result<SpawnResult, SpawnError> {
    cfg.store.close();
    let result = SpawnResult {
        id: cfg.id,
        status,
        signal,
        error: None,
        duration: started.elapsed(),
        aborted: cfg.cancel.is_cancelled(),
        store: cfg.store.clone(),
        origin: cfg.origin.clone(),
    };
    let (result, raise) = finalize(result, raw, cfg.nothrow, cfg.nohandle);
    emit(
        &cfg.bus,
        &cfg.hooks,
        RunEvent::End(Settled {
            status: result.status,
            signal: result.signal.clone(),
            aborted: result.aborted,
        }),
    );
    match raise {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

pub(crate) fn emit(bus: &EventBus, hooks: &Hooks, event: RunEvent) {
    hooks.dispatch(&event);
    bus.publish(event);
}

/// Classify the outcome and apply the `nothrow`/`nohandle` policy.
///
/// Returns the result (with `.error` populated) and the error to raise, if
/// any. An explicit spawn-level error always wins the classification.
fn finalize(
    mut result: SpawnResult,
    raw: Option<SpawnError>,
    nothrow: bool,
    nohandle: bool,
) -> (SpawnResult, Option<SpawnError>) {
    let classified = if nohandle {
        raw
    } else {
        classify(&result, raw)
    };
    result.error = classified.clone();
    let raise = if nothrow { None } else { classified };
    (result, raise)
}

fn classify(result: &SpawnResult, raw: Option<SpawnError>) -> Option<SpawnError> {
    if let Some(err) = raw {
        return Some(err);
    }
    if let Some(signal) = result.signal() {
        return Some(SpawnError::Signaled {
            signal: signal.to_string(),
            message: format_exit_message(
                result.status(),
                Some(signal),
                &result.stderr(),
                result.origin(),
            ),
        });
    }
    match result.status() {
        Some(0) | None if result.aborted() => Some(SpawnError::Aborted {
            reason: "cancelled before completion".into(),
        }),
        Some(0) => None,
        Some(code) => Some(SpawnError::NonZeroExit {
            code,
            message: format_exit_message(Some(code), None, &result.stderr(), result.origin()),
        }),
        None => None,
    }
}

fn build_command(cfg: &SpawnConfig) -> std::process::Command {
    let mut command = match &cfg.shell {
        Shell::Off => {
            let mut command = std::process::Command::new(&cfg.cmd);
            command.args(&cfg.args);
            command
        }
        Shell::Default => shell_command(&command_line(cfg)),
        Shell::Program(program) => {
            let mut command = std::process::Command::new(program);
            command.arg("-c").arg(command_line(cfg));
            command
        }
    };
    command.current_dir(&cfg.cwd);
    command.env_clear();
    command.envs(&cfg.env);

    command.stdin(if cfg.input.is_some() {
        std::process::Stdio::piped()
    } else {
        cfg.stdio.stdin.to_stdio()
    });
    command.stdout(cfg.stdio.stdout.to_stdio());
    command.stderr(cfg.stdio.stderr.to_stdio());

    #[cfg(unix)]
    {
        if cfg.detached {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

fn command_line(cfg: &SpawnConfig) -> String {
    if cfg.args.is_empty() {
        cfg.cmd.clone()
    } else {
        format!("{} {}", cfg.cmd, cfg.args.join(" "))
    }
}

fn shell_command(line: &str) -> std::process::Command {
    if cfg!(unix) {
        let mut command = std::process::Command::new("/bin/sh");
        command.arg("-c").arg(line);
        command
    } else {
        let mut command = std::process::Command::new("cmd");
        command.args(["/d", "/s", "/c", line]);
        command
    }
}
