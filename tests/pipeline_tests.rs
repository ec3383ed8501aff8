// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline tests: composition across settled and pending invocations.
#![cfg(unix)]

use spindle_core::{Input, SpawnDefaults, SpawnOptions, spawn, spawn_blocking};
use std::time::Duration;

fn defaults() -> SpawnDefaults {
    SpawnDefaults::capture()
}

#[tokio::test]
async fn sort_pipeline_orders_the_lines() {
    let source = spawn(SpawnOptions::new(r"printf '5\n3\n1\n4\n2\n'"), &defaults());
    let sorted = source.pipe("sort", &defaults()).unwrap();
    assert_eq!(sorted.wait().await.unwrap().stdout(), "1\n2\n3\n4\n5\n");
}

#[tokio::test]
async fn upstream_handle_can_be_used_as_input_directly() {
    let upstream = spawn(
        SpawnOptions::new("printf streamed; sleep 0.1; printf _input"),
        &defaults(),
    );
    let downstream = spawn(
        SpawnOptions::new("cat").input(Input::from(&upstream)),
        &defaults(),
    );
    assert_eq!(downstream.output().await.unwrap(), "streamed_input");
}

#[tokio::test]
async fn fan_out_pipes_do_not_split_the_stream() {
    let source = spawn(
        SpawnOptions::new("printf alpha; sleep 0.1; printf beta"),
        &defaults(),
    );
    let one = source.pipe("cat", &defaults()).unwrap();
    let two = source.pipe("cat", &defaults()).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let three = source.pipe("cat", &defaults()).unwrap();

    for piped in [one, two, three] {
        assert_eq!(piped.wait().await.unwrap().stdout(), "alphabeta");
    }
}

#[test]
fn settled_round_trip_matches_manual_feeding() {
    let source = spawn_blocking(SpawnOptions::new(r"printf 'z\ny\nx\n'"), &defaults()).unwrap();

    let via_pipe = source
        .pipe("sort", &defaults())
        .unwrap()
        .into_settled()
        .unwrap();
    let via_input = spawn_blocking(
        SpawnOptions::new("sort").input(source.stdout()),
        &defaults(),
    )
    .unwrap();

    assert_eq!(via_pipe.stdout(), via_input.stdout());
    assert_eq!(via_pipe.stdout(), "x\ny\nz\n");
}

#[tokio::test]
async fn pipeline_counts_lines_across_stages() {
    let source = spawn(SpawnOptions::new(r"printf 'a\nb\nc\n'"), &defaults());
    let counted = source.pipe("wc -l", &defaults()).unwrap();
    let text = counted.wait().await.unwrap().stdout();
    assert_eq!(text.trim(), "3");
}
