// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side job registry.
//!
//! Holds the in-memory `{qid → Ray}` map, the FIFO task queue, and the two
//! bounded partial-output caches. Its job loop appears to run jobs but
//! actually delegates each qid to a [`JobRunner`] — the supervisor's
//! blocking wait — which is what keeps the serving layer oblivious to the
//! process boundary.

use async_trait::async_trait;
use parking_lot::Mutex;
use rh_core::{Clock, LruCacheMap, Qid, Ray, RayStatus};
use rh_storage::{AssetKind, AssetStore};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the partial-output and reported-hash caches.
const PARTIAL_CACHE_SIZE: usize = 3;

/// Executes one queued job to completion.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, qid: Qid);
}

/// In-memory registry and queue in front of the supervisor.
pub struct Engine<C: Clock> {
    assets: AssetStore,
    clock: C,
    rays: Mutex<HashMap<Qid, Ray>>,
    queue: Mutex<VecDeque<Qid>>,
    wake: Notify,
    cancel: CancellationToken,
    /// Last-known deserialized partial output per qid
    partials: Mutex<LruCacheMap<Qid, Value>>,
    /// Last hash reported to a watcher per qid (None = cleared)
    reported: Mutex<LruCacheMap<Qid, Option<String>>>,
}

impl<C: Clock + 'static> Engine<C> {
    /// Build the registry, re-materializing rays persisted by an earlier
    /// run. Removed rays stay gone; queued-but-unstarted rays reappear in
    /// the map but are not re-enqueued.
    pub fn new(assets: AssetStore, clock: C) -> Self {
        let mut rays = HashMap::new();
        for qid in assets.scan_qids() {
            let Some(value) = assets.get(&qid, AssetKind::Ray) else { continue };
            match serde_json::from_value::<Ray>(value) {
                Ok(ray) if ray.status != RayStatus::Removed => {
                    rays.insert(qid, ray);
                }
                Ok(_) => {}
                Err(e) => warn!(qid = %qid, error = %e, "skipping unreadable ray"),
            }
        }
        Self {
            assets,
            clock,
            rays: Mutex::new(rays),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            partials: Mutex::new(LruCacheMap::new(PARTIAL_CACHE_SIZE)),
            reported: Mutex::new(LruCacheMap::new(PARTIAL_CACHE_SIZE)),
        }
    }

    /// Spawn the job loop. Each popped qid runs to completion before the
    /// next is considered.
    pub fn start(self: &Arc<Self>, runner: Arc<dyn JobRunner>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let popped = engine.queue.lock().pop_front();
                match popped {
                    Some(qid) => runner.run(qid).await,
                    None => {
                        tokio::select! {
                            _ = engine.cancel.cancelled() => break,
                            _ = engine.wake.notified() => {}
                        }
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Look up a ray without creating it.
    pub fn get(&self, qid: &Qid) -> Option<Ray> {
        self.rays.lock().get(qid).cloned()
    }

    /// Look up a ray, creating a blank one on miss.
    pub fn ray(&self, qid: &Qid) -> Ray {
        self.rays.lock().entry(qid.clone()).or_insert_with(|| Ray::new(qid.clone())).clone()
    }

    /// Mutate a ray in place (created on miss), returning the closure's
    /// result.
    pub fn with_ray<R>(&self, qid: &Qid, f: impl FnOnce(&mut Ray) -> R) -> R {
        let mut rays = self.rays.lock();
        let ray = rays.entry(qid.clone()).or_insert_with(|| Ray::new(qid.clone()));
        f(ray)
    }

    /// All rays matching a filter, oldest first.
    pub fn rays(&self, filter: impl Fn(&Ray) -> bool) -> Vec<Ray> {
        let mut rays: Vec<Ray> =
            self.rays.lock().values().filter(|r| filter(r)).cloned().collect();
        rays.sort_by_key(|r| r.created_at);
        rays
    }

    /// Enqueue a qid, deduplicated. Returns false when it was already
    /// pending.
    pub fn enqueue(&self, qid: Qid) -> bool {
        let added = {
            let mut queue = self.queue.lock();
            if queue.contains(&qid) {
                false
            } else {
                queue.push_back(qid);
                true
            }
        };
        if added {
            self.wake.notify_one();
        }
        added
    }

    /// Currently queued qids, FIFO order.
    pub fn queued(&self) -> Vec<Qid> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Drop a qid from the queue. Returns whether it was queued.
    pub fn remove_from_queue(&self, qid: &Qid) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|q| q != qid);
        queue.len() != before
    }

    /// Forget a ray entirely (its assets are the caller's problem).
    pub fn drop_entry(&self, qid: &Qid) {
        self.rays.lock().remove(qid);
        self.partials.lock().remove(qid);
        self.reported.lock().remove(qid);
    }

    /// Record a partial output snapshot from the worker.
    pub fn partial_output(&self, qid: &Qid, partial: Value) {
        debug!(qid = %qid, "partial output");
        self.partials.lock().put(qid.clone(), partial, self.clock.epoch_ms());
    }

    pub fn get_partial_output(&self, qid: &Qid) -> Option<Value> {
        self.partials.lock().get(qid).cloned()
    }

    /// Stamp of the last partial for freshness polling.
    pub fn partial_output_ts(&self, qid: &Qid) -> Option<u64> {
        self.partials.lock().updated_at_ms(qid)
    }

    /// Remember (or clear, with `None`) the hash last reported to the
    /// watcher of this qid.
    pub fn set_reported(&self, qid: &Qid, hash: Option<String>) {
        self.reported.lock().put(qid.clone(), hash, self.clock.epoch_ms());
    }

    /// Hash last reported to the watcher, if any.
    pub fn get_reported(&self, qid: &Qid) -> Option<String> {
        self.reported.lock().get(qid).cloned().flatten()
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
