// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial-output streaming to watchers.
//!
//! At most one watcher per session, watching at most one qid. A watch task
//! polls the engine's partial cache at 100 ms; every fresh snapshot is
//! delta-encoded against the watcher's accumulated base and emitted as a
//! `partial` event, chained by hashes. The accepted snapshot is also
//! persisted to `out.json` so a late joiner can restore it.

use crate::engine::Engine;
use crate::notify::SessionNotifier;
use crate::session::SessionLink;
use parking_lot::Mutex;
use rh_core::{diff, PartialPacket, Qid, Sid, SystemClock};
use rh_storage::{AssetKind, AssetStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const WATCH_PERIOD: Duration = Duration::from_millis(100);

/// Per-watch accumulation state, local to one watch task.
struct WatchState {
    last_stamp: Option<u64>,
    accumulated: Option<Value>,
}

/// Fan-out of partial-output deltas, one stream per watching session.
pub struct WatchController<N: SessionNotifier> {
    engine: Arc<Engine<SystemClock>>,
    assets: AssetStore,
    sessions: SessionLink,
    notifier: Arc<Mutex<Option<Arc<N>>>>,
    watchers: Arc<Mutex<HashMap<Sid, Qid>>>,
}

impl<N: SessionNotifier> WatchController<N> {
    pub fn new(
        engine: Arc<Engine<SystemClock>>,
        assets: AssetStore,
        sessions: SessionLink,
        notifier: Arc<Mutex<Option<Arc<N>>>>,
    ) -> Self {
        Self {
            engine,
            assets,
            sessions,
            notifier,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Point a session's watch at a qid and start streaming to it.
    /// Replaces the session's previous watch; its accumulated state dies
    /// with its task.
    pub fn watch(&self, sid: Sid, qid: Qid) {
        self.watchers.lock().insert(sid.clone(), qid.clone());
        self.engine.set_reported(&qid, None);
        info!(sid = %sid, qid = %qid, "watch started");

        let engine = Arc::clone(&self.engine);
        let assets = self.assets.clone();
        let sessions = self.sessions.clone();
        let notifier = Arc::clone(&self.notifier);
        let watchers = Arc::clone(&self.watchers);
        tokio::spawn(async move {
            let mut state = WatchState { last_stamp: None, accumulated: None };
            loop {
                if !sessions.is_active(&sid) {
                    debug!(sid = %sid, "watch ended: session gone");
                    break;
                }
                if watchers.lock().get(&sid) != Some(&qid) {
                    debug!(sid = %sid, qid = %qid, "watch ended: replaced");
                    break;
                }
                let Some(ray) = engine.get(&qid) else { break };
                if ray.finished {
                    info!(sid = %sid, qid = %qid, "watch ended: execution finished");
                    break;
                }

                if let Some(payload) = poll_partial(&engine, &assets, &qid, &mut state) {
                    let notifier = notifier.lock().clone();
                    if let Some(notifier) = notifier {
                        notifier.emit("partial", payload, &sid);
                    }
                }

                tokio::time::sleep(WATCH_PERIOD).await;
            }
        });
    }

    /// Clear the reported hash so the next emission for this qid is a
    /// refresh (requested by a client whose accumulated hash diverged).
    pub fn reset_watch(&self, qid: &Qid) {
        if self.engine.get_reported(qid).is_some() {
            debug!(qid = %qid, "clearing partial state");
            self.engine.set_reported(qid, None);
        }
    }

    /// Drop a session's watch (on disconnect).
    pub fn unwatch(&self, sid: &Sid) {
        self.watchers.lock().remove(sid);
    }
}

/// One poll step of a watch loop.
///
/// Emits only when the partial cache holds something newer than the last
/// accepted stamp AND its hash differs from the last reported one; the
/// accepted snapshot becomes the new delta base and is persisted for late
/// joiners.
fn poll_partial(
    engine: &Engine<SystemClock>,
    assets: &AssetStore,
    qid: &Qid,
    state: &mut WatchState,
) -> Option<Value> {
    // A cleared reported hash (reset_watch, or a fresh watch) restarts
    // accumulation: the next packet is a refresh.
    if engine.get_reported(qid).is_none() {
        state.last_stamp = None;
        state.accumulated = None;
    }

    let stamp = engine.partial_output_ts(qid)?;
    if state.last_stamp == Some(stamp) {
        return None;
    }

    let target = engine.get_partial_output(qid)?;
    let refresh = state.last_stamp.is_none();
    let base = match (&state.accumulated, refresh) {
        (Some(accumulated), false) => accumulated.clone(),
        _ => empty_like(&target),
    };

    let delta = diff(&base, &target);
    // The worker may republish an identical snapshot; hashes dedupe it.
    if engine.get_reported(qid).as_deref() == Some(delta.new_hash.as_str()) {
        return None;
    }

    let packet = PartialPacket { qid: qid.clone(), refresh, delta };
    engine.set_reported(qid, Some(packet.delta.new_hash.clone()));
    state.accumulated = Some(target.clone());
    state.last_stamp = Some(stamp);

    // Persist so a client joining later can restore the latest snapshot.
    if let Err(e) = assets.set(qid, AssetKind::Out, &target) {
        warn!(qid = %qid, error = %e, "failed to persist partial output");
    }

    let ray = engine.get(qid)?;
    Some(json!({ "output": packet, "ray": ray }))
}

fn empty_like(target: &Value) -> Value {
    if target.is_array() {
        Value::Array(Vec::new())
    } else {
        Value::Object(serde_json::Map::new())
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
