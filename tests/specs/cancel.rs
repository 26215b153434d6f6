// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::{boot, wait_until};
use rh_core::RayStatus;
use rh_storage::{AssetKind, AssetStore};
use rh_supervisor::PrepareOptions;
use rh_wire::Action;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn cancel_of_a_stubborn_callback_kills_and_respawns_the_worker() {
    let s = boot("sleepy").await;
    let qid = s.supervisor.prepare(json!({}), PrepareOptions::default()).await.expect("prepare");

    // Wait for the callback to actually be running.
    let line = format!("start {qid}");
    let started = wait_until(Duration::from_secs(20), || s.trace_count(&line) == 1).await;
    assert!(started, "worker never started the callback");
    assert!(s.supervisor.worker_alive());

    tokio::time::sleep(Duration::from_millis(200)).await;
    s.supervisor.cancel_execution(&qid).await;

    // The callback ignores cancel, so hara-kiri must take the worker down
    // within the one-second timeout.
    let died =
        wait_until(Duration::from_millis(1500), || !s.supervisor.worker_alive()).await;
    assert!(died, "worker must exit within the hara-kiri timeout");

    // Final state: cancelled, finished, and no out ever written.
    let ray = s.supervisor.engine().get(&qid).expect("ray");
    assert_eq!(ray.status, RayStatus::Canceled);
    assert!(ray.finished);
    let assets = AssetStore::new(s.dir.path());
    assert_eq!(assets.get(&qid, AssetKind::Out), None);

    // The next dispatch brings a fresh worker back.
    s.supervisor.dispatch(Action::Check(qid.clone()), true).await;
    let respawned = wait_until(Duration::from_secs(10), || s.supervisor.worker_alive()).await;
    assert!(respawned, "dispatch must respawn a dead worker");

    // And nothing the dead callback did leaks out afterwards.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let ray = s.supervisor.engine().get(&qid).expect("ray");
    assert_eq!(ray.status, RayStatus::Canceled);
    assert_eq!(assets.get(&qid, AssetKind::Out), None);
    assert_eq!(s.trace_count(&format!("end {qid}")), 0);
    s.supervisor.shutdown();
}
