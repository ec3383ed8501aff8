// SPDX-License-Identifier: MIT OR Apache-2.0
//! Policy tests: `nothrow`/`nohandle` and the user-visible error surface.
#![cfg(unix)]

use spindle_core::{Shell, SpawnDefaults, SpawnErrorKind, SpawnOptions, spawn, spawn_blocking};
use spindle_error::{errno_message, exit_code_info};

fn defaults() -> SpawnDefaults {
    SpawnDefaults::capture()
}

#[test]
fn default_policy_raises_on_nonzero_exit() {
    let err = spawn_blocking(SpawnOptions::new("exit 2"), &defaults()).unwrap_err();
    assert_eq!(err.kind(), SpawnErrorKind::NonZeroExit);
    let message = err.to_string();
    assert!(message.contains("exit code: 2"), "{message}");
    assert!(
        message.contains(exit_code_info(2).unwrap()),
        "well-known codes carry their documented cause: {message}"
    );
}

#[test]
fn error_message_embeds_the_origin_call_site() {
    let err = spawn_blocking(SpawnOptions::new("exit 1"), &defaults()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("policy_tests.rs"), "origin missing: {message}");
}

#[test]
fn error_message_leads_with_the_stderr_tail() {
    let err = spawn_blocking(SpawnOptions::new("echo diagnostic >&2; exit 1"), &defaults())
        .unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("diagnostic\n"), "{message}");
}

#[test]
fn spawn_failure_message_maps_the_errno() {
    let err = spawn_blocking(
        SpawnOptions::new("missing-binary-for-policy-test").shell(Shell::Off),
        &defaults(),
    )
    .unwrap_err();
    assert!(err.is_spawn_failure());
    let message = err.to_string();
    assert!(
        message.contains(errno_message(2)),
        "ENOENT should map to a readable cause: {message}"
    );
}

#[test]
fn nothrow_returns_the_result_with_error_set() {
    let result = spawn_blocking(SpawnOptions::new("exit 2").nothrow(true), &defaults()).unwrap();
    assert_eq!(result.status(), Some(2));
    assert_eq!(result.error().unwrap().code(), Some(2));
}

#[test]
fn nothrow_success_has_no_error() {
    let result = spawn_blocking(SpawnOptions::new("echo fine").nothrow(true), &defaults()).unwrap();
    assert!(result.success());
    assert!(result.error().is_none());
}

#[test]
fn nohandle_ignores_exit_classification() {
    let result = spawn_blocking(SpawnOptions::new("exit 9").nohandle(true), &defaults()).unwrap();
    assert_eq!(result.status(), Some(9));
    assert!(result.error().is_none());
}

#[test]
fn nohandle_still_surfaces_spawn_errors() {
    let err = spawn_blocking(
        SpawnOptions::new("missing-binary-for-policy-test")
            .shell(Shell::Off)
            .nohandle(true),
        &defaults(),
    )
    .unwrap_err();
    assert!(err.is_spawn_failure());
}

#[tokio::test]
async fn async_policy_matches_sync_policy() {
    let err = spawn(SpawnOptions::new("exit 2"), &defaults())
        .wait()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exit code: 2"));

    let result = spawn(SpawnOptions::new("exit 2").nothrow(true), &defaults())
        .wait()
        .await
        .unwrap();
    assert_eq!(result.status(), Some(2));
    assert!(result.error().is_some());
}

#[tokio::test]
async fn signal_termination_names_the_signal() {
    let handle = spawn(SpawnOptions::new("sleep 5"), &defaults());
    for _ in 0..500 {
        if handle.pid().is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    handle.kill(None).await.unwrap();
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err.kind(), SpawnErrorKind::Signaled);
    assert!(err.to_string().contains("signal: SIGTERM"));
}
