// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-crate orchestration tests: replay guarantees, hook detachment,
//! and cancellation reasons flowing between the member crates.
#![cfg(unix)]

use spindle_cancel::AbortReason;
use spindle_core::{Hooks, SpawnDefaults, SpawnOptions, spawn};
use spindle_stream::Channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn defaults() -> SpawnDefaults {
    SpawnDefaults::capture()
}

#[tokio::test]
async fn late_subscriber_sees_what_an_early_one_saw() {
    let handle = spawn(
        SpawnOptions::new("printf first; sleep 0.1; printf second"),
        &defaults(),
    );
    let early = handle.tap(Channel::Stdout);
    handle.wait().await.unwrap();
    let late = handle.tap(Channel::Stdout);

    let early_text = early.collect_text().await;
    let late_text = late.collect_text().await;
    assert_eq!(early_text, "firstsecond");
    assert_eq!(early_text, late_text, "replay must equal live observation");
}

#[tokio::test]
async fn partial_reads_are_visible_mid_flight() {
    let handle = spawn(
        SpawnOptions::new("printf visible; sleep 0.3; printf more"),
        &defaults(),
    );
    let store = handle.store();
    for _ in 0..100 {
        if store.text(Channel::Stdout) == "visible" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.text(Channel::Stdout), "visible");

    let result = handle.wait().await.unwrap();
    assert_eq!(result.stdout(), "visiblemore");
}

#[tokio::test]
async fn hooks_never_fire_after_end() {
    let counts = Arc::new(Mutex::new((0usize, 0usize)));
    let hooks = Hooks::new()
        .on_stdout({
            let counts = Arc::clone(&counts);
            move |_| counts.lock().unwrap().0 += 1
        })
        .on_end({
            let counts = Arc::clone(&counts);
            move |_| counts.lock().unwrap().1 += 1
        });

    let handle = spawn(SpawnOptions::new("echo once").hooks(hooks), &defaults());
    handle.wait().await.unwrap();
    let after_settle = *counts.lock().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*counts.lock().unwrap(), after_settle);
    assert_eq!(after_settle.1, 1, "end is delivered at most once");
}

#[tokio::test]
async fn repeated_invocations_do_not_share_buses_or_stores() {
    let first = spawn(SpawnOptions::new("echo one"), &defaults());
    first.wait().await.unwrap();

    let second = spawn(SpawnOptions::new("echo two"), &defaults());
    let result = second.wait().await.unwrap();

    assert_eq!(result.stdout(), "two\n");
    assert_eq!(first.store().text(Channel::Stdout), "one\n");
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn abort_reason_is_observable_on_the_shared_token() {
    let handle = spawn(SpawnOptions::new("sleep 5").nothrow(true), &defaults());
    for _ in 0..500 {
        if handle.pid().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.abort(Some(AbortReason::Other("operator stop".into())));
    let result = handle.wait().await.unwrap();
    assert!(result.aborted());
    assert_eq!(
        handle.cancel_token().reason(),
        Some(AbortReason::Other("operator stop".into()))
    );
}

#[tokio::test]
async fn stderr_and_stdout_interleave_in_stdall() {
    let handle = spawn(
        SpawnOptions::new("printf out1; printf err1 >&2; sleep 0.05; printf out2"),
        &defaults(),
    );
    let result = handle.wait().await.unwrap();
    assert_eq!(result.stdout(), "out1out2");
    assert_eq!(result.stderr(), "err1");
    let stdall = result.stdall();
    assert!(stdall.contains("out1") && stdall.contains("err1") && stdall.contains("out2"));
    assert!(stdall.find("out1").unwrap() < stdall.find("out2").unwrap());
}
