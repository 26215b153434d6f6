// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rh_core::FakeClock;
use serde_json::json;

fn engine() -> (tempfile::TempDir, Engine<FakeClock>) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(AssetStore::new(dir.path()), FakeClock::new());
    (dir, engine)
}

#[test]
fn ray_is_created_on_miss_and_discoverable() {
    let (_dir, engine) = engine();
    let qid = Qid::new("a");
    assert!(engine.get(&qid).is_none());
    let ray = engine.ray(&qid);
    assert_eq!(ray.qid, qid);
    assert!(engine.get(&qid).is_some());
}

#[test]
fn with_ray_mutates_in_place() {
    let (_dir, engine) = engine();
    let qid = Qid::new("a");
    engine.with_ray(&qid, |ray| ray.set_status(RayStatus::Queued));
    assert_eq!(engine.get(&qid).unwrap().status, RayStatus::Queued);
}

#[test]
fn enqueue_deduplicates() {
    let (_dir, engine) = engine();
    assert!(engine.enqueue(Qid::new("a")));
    assert!(!engine.enqueue(Qid::new("a")));
    assert!(engine.enqueue(Qid::new("b")));
    assert_eq!(engine.queued(), vec![Qid::new("a"), Qid::new("b")]);
}

#[test]
fn remove_from_queue() {
    let (_dir, engine) = engine();
    engine.enqueue(Qid::new("a"));
    engine.enqueue(Qid::new("b"));
    assert!(engine.remove_from_queue(&Qid::new("a")));
    assert!(!engine.remove_from_queue(&Qid::new("a")));
    assert_eq!(engine.queued(), vec![Qid::new("b")]);
}

#[test]
fn startup_seeds_from_disk_skipping_removed() {
    let dir = tempfile::tempdir().unwrap();
    let assets = AssetStore::new(dir.path());
    for (name, status) in
        [("keep", RayStatus::Completed), ("gone", RayStatus::Removed), ("wip", RayStatus::Queued)]
    {
        let qid = Qid::new(name);
        let mut ray = Ray::new(qid.clone());
        ray.set_status(status);
        assets.set(&qid, AssetKind::Ray, &serde_json::to_value(&ray).unwrap()).unwrap();
    }

    let engine = Engine::new(assets, FakeClock::new());
    assert!(engine.get(&Qid::new("keep")).is_some());
    assert!(engine.get(&Qid::new("wip")).is_some());
    assert!(engine.get(&Qid::new("gone")).is_none(), "removed rays stay gone");
    // Re-materialized, but nothing is re-enqueued.
    assert!(engine.queued().is_empty());
}

#[test]
fn partial_cache_is_bounded() {
    let (_dir, engine) = engine();
    for name in ["a", "b", "c", "d"] {
        engine.partial_output(&Qid::new(name), json!({ "from": name }));
    }
    assert!(engine.get_partial_output(&Qid::new("a")).is_none(), "capacity 3 evicts the oldest");
    assert!(engine.get_partial_output(&Qid::new("d")).is_some());
}

#[test]
fn partial_stamps_advance_per_put() {
    let (_dir, engine) = engine();
    let qid = Qid::new("a");
    engine.partial_output(&qid, json!(1));
    let first = engine.partial_output_ts(&qid).unwrap();
    engine.partial_output(&qid, json!(2));
    let second = engine.partial_output_ts(&qid).unwrap();
    assert!(second > first);
}

#[test]
fn reported_hash_can_be_cleared() {
    let (_dir, engine) = engine();
    let qid = Qid::new("a");
    assert_eq!(engine.get_reported(&qid), None);
    engine.set_reported(&qid, Some("h1".into()));
    assert_eq!(engine.get_reported(&qid), Some("h1".into()));
    engine.set_reported(&qid, None);
    assert_eq!(engine.get_reported(&qid), None);
}

#[test]
fn drop_entry_forgets_everything() {
    let (_dir, engine) = engine();
    let qid = Qid::new("a");
    engine.ray(&qid);
    engine.partial_output(&qid, json!(1));
    engine.set_reported(&qid, Some("h".into()));
    engine.drop_entry(&qid);
    assert!(engine.get(&qid).is_none());
    assert!(engine.get_partial_output(&qid).is_none());
    assert_eq!(engine.get_reported(&qid), None);
}

#[test]
fn rays_filters_and_sorts_by_creation() {
    let (_dir, engine) = engine();
    engine.with_ray(&Qid::new("a"), |ray| ray.set_status(RayStatus::Queued));
    engine.with_ray(&Qid::new("b"), |ray| ray.set_status(RayStatus::Completed));
    let queued = engine.rays(|r| r.status == RayStatus::Queued);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].qid, Qid::new("a"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_loop_runs_queued_jobs_in_order() {
    use parking_lot::Mutex as PMutex;

    struct Recorder(PMutex<Vec<Qid>>);

    #[async_trait]
    impl JobRunner for Recorder {
        async fn run(&self, qid: Qid) {
            self.0.lock().push(qid);
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new(AssetStore::new(dir.path()), FakeClock::new()));
    let recorder = Arc::new(Recorder(PMutex::new(Vec::new())));
    engine.start(recorder.clone() as Arc<dyn JobRunner>);

    engine.enqueue(Qid::new("a"));
    engine.enqueue(Qid::new("b"));
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    engine.stop();

    assert_eq!(*recorder.0.lock(), vec![Qid::new("a"), Qid::new("b")]);
}
