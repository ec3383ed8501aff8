// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine tests: both spawn paths, classification policy, env/cwd handling.
#![cfg(unix)]

use spindle_core::{
    Hooks, Input, Shell, SpawnDefaults, SpawnError, SpawnErrorKind, SpawnOptions, spawn,
    spawn_blocking,
};
use std::sync::{Arc, Mutex};

fn defaults() -> SpawnDefaults {
    SpawnDefaults::capture()
}

// ---------------------------------------------------------------------------
// Synchronous path
// ---------------------------------------------------------------------------

#[test]
fn sync_echo_collects_stdout() {
    let result = spawn_blocking(SpawnOptions::new("echo foo"), &defaults()).expect("echo should succeed");
    assert_eq!(result.status(), Some(0));
    assert_eq!(result.signal(), None);
    assert_eq!(result.stdout(), "foo\n");
    assert!(result.success());
    assert!(result.error().is_none());
}

#[test]
fn sync_display_is_trimmed_output() {
    let result = spawn_blocking(SpawnOptions::new("echo value"), &defaults()).unwrap();
    assert_eq!(result.to_string(), "value");
}

#[test]
fn sync_nonzero_exit_raises_with_code_in_message() {
    let err = spawn_blocking(SpawnOptions::new("exit 2"), &defaults()).expect_err("exit 2 should fail");
    assert_eq!(err.kind(), SpawnErrorKind::NonZeroExit);
    assert_eq!(err.code(), Some(2));
    assert!(err.to_string().contains("exit code: 2"), "message was: {err}");
}

#[test]
fn sync_nothrow_settles_with_error_attached() {
    let result = spawn_blocking(SpawnOptions::new("exit 2").nothrow(true), &defaults())
        .expect("nothrow suppresses the raise");
    assert_eq!(result.status(), Some(2));
    let err = result.error().expect("classification still recorded");
    assert!(err.to_string().contains("exit code: 2"));
}

#[test]
fn sync_nohandle_skips_classification() {
    let result = spawn_blocking(SpawnOptions::new("exit 3").nohandle(true), &defaults())
        .expect("nonzero exit is not raised under nohandle");
    assert_eq!(result.status(), Some(3));
    assert!(result.error().is_none());
}

#[test]
fn sync_spawn_failure_is_classified_and_raised() {
    let err = spawn_blocking(
        SpawnOptions::new("definitely-not-a-command-xyz").shell(Shell::Off),
        &defaults(),
    )
    .expect_err("missing executable");
    assert!(err.is_spawn_failure());
    assert!(err.to_string().contains("errno"), "message was: {err}");
}

#[test]
fn sync_spawn_failure_with_nothrow_still_settles() {
    let result = spawn_blocking(
        SpawnOptions::new("definitely-not-a-command-xyz")
            .shell(Shell::Off)
            .nothrow(true),
        &defaults(),
    )
    .expect("nothrow returns the result");
    assert_eq!(result.status(), None);
    assert_eq!(result.signal(), None);
    assert_eq!(result.stdout(), "");
    assert!(result.error().map(SpawnError::is_spawn_failure).unwrap_or(false));
}

#[test]
fn sync_spawn_failure_still_fires_err_then_end() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = Hooks::new()
        .on_err({
            let seen = Arc::clone(&seen);
            move |_| seen.lock().unwrap().push("err")
        })
        .on_end({
            let seen = Arc::clone(&seen);
            move |_| seen.lock().unwrap().push("end")
        });
    let _ = spawn_blocking(
        SpawnOptions::new("definitely-not-a-command-xyz")
            .shell(Shell::Off)
            .hooks(hooks),
        &defaults(),
    );
    assert_eq!(*seen.lock().unwrap(), vec!["err", "end"]);
}

#[test]
fn sync_env_override_reaches_the_child() {
    let result = spawn_blocking(
        SpawnOptions::new("echo $SPINDLE_TEST_VAR").env("SPINDLE_TEST_VAR", "from-test"),
        &defaults(),
    )
    .unwrap();
    assert_eq!(result.stdout(), "from-test\n");
}

#[test]
fn sync_env_remove_unsets_the_variable() {
    let result = spawn_blocking(
        SpawnOptions::new("echo \"x${SPINDLE_GONE}x\"")
            .env("SPINDLE_GONE", "leaks")
            .env_remove("SPINDLE_GONE"),
        &defaults(),
    )
    .unwrap();
    assert_eq!(result.stdout(), "xx\n");
}

#[test]
fn sync_cwd_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let canonical = dir.path().canonicalize().unwrap();
    let result = spawn_blocking(SpawnOptions::new("pwd").cwd(&canonical), &defaults()).unwrap();
    assert_eq!(result.stdout().trim(), canonical.to_string_lossy());
}

#[test]
fn sync_raw_input_feeds_stdin() {
    let result = spawn_blocking(SpawnOptions::new("cat").input("hello stdin"), &defaults()).unwrap();
    assert_eq!(result.stdout(), "hello stdin");
}

#[test]
fn sync_shell_off_executes_directly() {
    let result = spawn_blocking(
        SpawnOptions::new("echo").arg("no shell").shell(Shell::Off),
        &defaults(),
    )
    .unwrap();
    assert_eq!(result.stdout(), "no shell\n");
}

#[test]
fn sync_rejects_streaming_input_fast() {
    let err = spawn_blocking(
        SpawnOptions::new("cat").input(Input::Reader(Box::new(tokio::io::empty()))),
        &defaults(),
    )
    .expect_err("streaming input needs the async path");
    assert_eq!(err.kind(), SpawnErrorKind::Unsupported);
}

#[test]
fn sync_stderr_is_collected_separately() {
    let result = spawn_blocking(SpawnOptions::new("echo oops >&2"), &defaults()).unwrap();
    assert_eq!(result.stdout(), "");
    assert_eq!(result.stderr(), "oops\n");
    assert_eq!(result.stdall(), "oops\n");
}

// ---------------------------------------------------------------------------
// Asynchronous path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn async_echo_settles_with_stdout() {
    let handle = spawn(SpawnOptions::new("echo foo"), &defaults());
    let result = handle.wait().await.expect("echo should succeed");
    assert_eq!(result.status(), Some(0));
    assert_eq!(result.signal(), None);
    assert_eq!(result.stdout(), "foo\n");
}

#[tokio::test]
async fn async_handle_is_awaitable_directly() {
    let handle = spawn(SpawnOptions::new("echo direct"), &defaults());
    let result = handle.await.expect("IntoFuture surface");
    assert_eq!(result.stdout(), "direct\n");
}

#[tokio::test]
async fn async_derived_accessors_resolve_fields() {
    let handle = spawn(SpawnOptions::new("echo fields"), &defaults());
    assert_eq!(handle.status().await.unwrap(), Some(0));
    assert_eq!(handle.output().await.unwrap(), "fields\n");
    assert_eq!(handle.signal().await.unwrap(), None);
    assert!(handle.duration().await.unwrap() > std::time::Duration::ZERO);
}

#[tokio::test]
async fn async_nonzero_exit_rejects_by_default() {
    let handle = spawn(SpawnOptions::new("exit 2"), &defaults());
    let err = handle.wait().await.expect_err("exit 2 should reject");
    assert_eq!(err.code(), Some(2));
    assert!(err.to_string().contains("exit code: 2"));
}

#[tokio::test]
async fn async_nothrow_resolves_with_error_attached() {
    let handle = spawn(SpawnOptions::new("exit 2").nothrow(true), &defaults());
    let result = handle.wait().await.expect("nothrow resolves");
    assert_eq!(result.status(), Some(2));
    assert!(result.error().is_some());
}

#[tokio::test]
async fn async_nohandle_surfaces_only_raw_errors() {
    let handle = spawn(SpawnOptions::new("exit 3").nohandle(true), &defaults());
    let result = handle.wait().await.expect("no raw error, so no raise");
    assert_eq!(result.status(), Some(3));
    assert!(result.error().is_none());
}

#[tokio::test]
async fn async_spawn_failure_settles_instead_of_hanging() {
    let handle = spawn(
        SpawnOptions::new("definitely-not-a-command-xyz").shell(Shell::Off),
        &defaults(),
    );
    let err = handle.wait().await.expect_err("missing executable");
    assert!(err.is_spawn_failure());
}

#[tokio::test]
async fn async_input_from_settled_result() {
    let upstream = spawn_blocking(SpawnOptions::new("printf upstream"), &defaults()).unwrap();
    let handle = spawn(SpawnOptions::new("cat").input(&upstream), &defaults());
    assert_eq!(handle.output().await.unwrap(), "upstream");
}

#[tokio::test]
async fn async_caller_can_drive_stdin_manually() {
    use tokio::io::AsyncWriteExt;

    let handle = spawn(SpawnOptions::new("cat"), &defaults());
    let mut stdin = None;
    for _ in 0..200 {
        stdin = handle.take_stdin();
        if stdin.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let mut stdin = stdin.expect("stdin should become available after spawn");
    stdin.write_all(b"driven by hand").await.unwrap();
    drop(stdin);
    assert_eq!(handle.output().await.unwrap(), "driven by hand");
}

#[tokio::test]
async fn async_concurrent_waiters_share_the_settlement() {
    let handle = spawn(SpawnOptions::new("echo shared"), &defaults());
    let (a, b, c) = tokio::join!(handle.wait(), handle.output(), handle.status());
    assert_eq!(a.unwrap().stdout(), "shared\n");
    assert_eq!(b.unwrap(), "shared\n");
    assert_eq!(c.unwrap(), Some(0));
}

#[tokio::test]
async fn async_chunk_order_matches_delivery_order() {
    let handle = spawn(
        SpawnOptions::new("printf a; sleep 0.05; printf b; sleep 0.05; printf c"),
        &defaults(),
    );
    let result = handle.wait().await.unwrap();
    assert_eq!(result.stdout(), "abc");
}
