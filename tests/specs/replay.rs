// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::{boot, wait_until};
use rh_storage::{AssetKind, AssetStore};
use rh_supervisor::PrepareOptions;
use rh_wire::Action;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn finished_ray_replays_after_a_worker_crash_without_re_executing() {
    let s = boot("abort").await;
    let qid = s.supervisor.prepare(json!({"x": 1}), PrepareOptions::default()).await.expect("prepare");

    // The callback completes its ray, the throttler ships the snapshot,
    // then the process dies before any final update.
    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&qid))
        .await
        .expect("process timed out");
    assert_eq!(output, None, "the dying callback never persisted an out");

    let ray = s.supervisor.engine().get(&qid).expect("ray");
    assert!(ray.finished, "the completed snapshot must have reached the supervisor");

    // On disk too, which is what the replay path reads.
    let assets = AssetStore::new(s.dir.path());
    let persisted: rh_core::Ray =
        serde_json::from_value(assets.get(&qid, AssetKind::Ray).expect("ray.json"))
            .expect("decode");
    assert!(persisted.finished);

    let died = wait_until(Duration::from_secs(5), || !s.supervisor.worker_alive()).await;
    assert!(died, "abort app must take its process down");
    assert_eq!(s.trace_count(&format!("start {qid}")), 1);

    // Re-offer the qid. Publishing is fire-and-forget, so repeat it while
    // the fresh worker connects; Add is idempotent over there.
    for _ in 0..6 {
        s.supervisor.dispatch(Action::Add(qid.clone()), true).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    // The respawned worker saw finished=true on disk: no second execution.
    assert_eq!(s.trace_count(&format!("start {qid}")), 1, "replay must not re-execute");
    let ray = s.supervisor.engine().get(&qid).expect("ray");
    assert!(ray.finished);
    s.supervisor.shutdown();
}
