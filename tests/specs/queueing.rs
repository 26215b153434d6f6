// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::boot;
use rh_supervisor::PrepareOptions;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn second_job_starts_only_after_the_first_finishes() {
    let s = boot("slow").await;
    let a = s.supervisor.prepare(json!({"x": 1}), PrepareOptions::default()).await.expect("a");
    let b = s.supervisor.prepare(json!({"x": 2}), PrepareOptions::default()).await.expect("b");

    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&b))
        .await
        .expect("process timed out");
    assert_eq!(output, Some(json!({"y": 4})));

    // Strictly serial: a ran to completion before b began.
    let trace = s.trace();
    assert_eq!(
        trace,
        vec![
            format!("start {a}"),
            format!("end {a}"),
            format!("start {b}"),
            format!("end {b}"),
        ]
    );

    let ray_a = s.supervisor.engine().get(&a).expect("ray a");
    assert!(ray_a.finished, "a must have finished before b completed");
    s.supervisor.shutdown();
}
