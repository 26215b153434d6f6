// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::{boot, wait_until};
use rh_core::StateStatus;
use rh_supervisor::PrepareOptions;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn idle_worker_suspends_and_work_wakes_it_back_up() {
    let s = boot("suspender").await;

    let qid = s.supervisor.prepare(json!({"x": 1}), PrepareOptions::default()).await.expect("a");
    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&qid))
        .await
        .expect("process timed out");
    assert_eq!(output, Some(json!({"y": 2})));

    // Queue drained: after the suspend period the worker asks to sleep and
    // the supervisor parks itself.
    let paused = wait_until(Duration::from_secs(15), || {
        s.supervisor.state().status == StateStatus::Paused
    })
    .await;
    assert!(paused, "supervisor must reach paused after the worker suspends");
    assert!(!s.supervisor.worker_alive(), "suspended worker is gone");

    // New work respawns the worker and resumes service.
    let qid = s.supervisor.prepare(json!({"x": 5}), PrepareOptions::default()).await.expect("b");
    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&qid))
        .await
        .expect("process timed out");
    assert_eq!(output, Some(json!({"y": 10})));

    let running = wait_until(Duration::from_secs(10), || {
        s.supervisor.state().status == StateStatus::Running
    })
    .await;
    assert!(running, "supervisor must be running again after resume");
    s.supervisor.shutdown();
}
