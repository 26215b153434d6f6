// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::boot;
use rh_core::RayStatus;
use rh_storage::{AssetKind, AssetStore};
use rh_supervisor::PrepareOptions;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn prepare_then_process_returns_the_output() {
    let s = boot("echo").await;
    let qid = s
        .supervisor
        .prepare(json!({"x": 1}), PrepareOptions::default())
        .await
        .expect("prepare");

    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&qid))
        .await
        .expect("process timed out");
    assert_eq!(output, Some(json!({"y": 2})));

    // The asset store agrees with what process returned.
    let assets = AssetStore::new(s.dir.path());
    assert_eq!(assets.get(&qid, AssetKind::Out), Some(json!({"y": 2})));

    // Final ray: completed and finished, and still the only one.
    let ray = s.supervisor.engine().get(&qid).expect("ray");
    assert_eq!(ray.status, RayStatus::Completed);
    assert!(ray.finished);
    assert_eq!(s.supervisor.engine().rays(|r| r.qid == qid).len(), 1);

    assert_eq!(s.trace_count(&format!("start {qid}")), 1);
    s.supervisor.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn caller_supplied_qid_is_kept() {
    let s = boot("echo").await;
    let qid = rh_core::Qid::new("caller-chosen");
    let opts = PrepareOptions { qid: Some(qid.clone()), ..Default::default() };
    let got = s.supervisor.prepare(json!({"x": 3}), opts).await.expect("prepare");
    assert_eq!(got, qid);

    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&qid))
        .await
        .expect("process timed out");
    assert_eq!(output, Some(json!({"y": 6})));
    s.supervisor.shutdown();
}
