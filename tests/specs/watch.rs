// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::harness::boot;
use rh_core::{PartialAccumulator, PartialPacket, Sid};
use rh_supervisor::PrepareOptions;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn watcher_receives_chained_deltas_that_fold_to_the_final_output() {
    let s = boot("streamer").await;
    let sid = Sid::new("watcher-session");
    s.supervisor.sessions().register_session(sid.clone());

    let opts = PrepareOptions { sid: Some(sid.clone()), ..Default::default() };
    let qid = s.supervisor.prepare(json!({}), opts).await.expect("prepare");
    s.supervisor.watch(sid.clone(), qid.clone());

    let output = tokio::time::timeout(Duration::from_secs(30), s.supervisor.process(&qid))
        .await
        .expect("process timed out");
    assert_eq!(output, Some(json!({"items": [1, 2, 3]})));

    // Give the watch loop a beat to finish flushing.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let emissions = s.notifier.of_kind("partial");
    assert_eq!(emissions.len(), 3, "one partial per distinct snapshot");
    assert!(emissions.iter().all(|e| e.room == Some(sid.clone())));

    let packets: Vec<PartialPacket> = emissions
        .iter()
        .map(|e| serde_json::from_value(e.data["output"].clone()).expect("packet"))
        .collect();

    // First is a refresh, the rest chain hash-to-hash.
    assert_eq!(
        packets.iter().map(|p| p.refresh).collect::<Vec<_>>(),
        vec![true, false, false]
    );
    assert_eq!(packets[1].delta.old_hash, packets[0].delta.new_hash);
    assert_eq!(packets[2].delta.old_hash, packets[1].delta.new_hash);

    // Folding the stream client-side reproduces the final output exactly.
    let mut accumulator = PartialAccumulator::new();
    for packet in &packets {
        accumulator.fold(packet).expect("fold");
    }
    assert_eq!(accumulator.value(), Some(&json!({"items": [1, 2, 3]})));
    s.supervisor.shutdown();
}
