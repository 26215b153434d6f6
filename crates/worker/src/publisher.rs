// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Throttled update publisher.
//!
//! A 100 ms tick drains at most one ray snapshot and one partial output per
//! cycle, so a callback that writes its response in a tight loop still puts
//! at most ≈10 emissions/s per job on the bus. Dirtiness is detected by
//! polling the attached model: the ray by its `updated_at`, the response by
//! its canonical hash.

use crate::model::AppModel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rh_core::{canonical_hash, Qid, Ray};
use rh_storage::ResourceStore;
use rh_wire::{Action, Publisher, UpdatePayload};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const PUBLISH_PERIOD: Duration = Duration::from_millis(100);

struct PubState {
    /// Explicitly pushed snapshot awaiting the next tick
    pending_ray: Option<Ray>,
    /// Model being watched for dirtiness, if an execution is active
    watched: Option<Watched>,
    last_ray_sent: Option<DateTime<Utc>>,
    last_output_hash: Option<String>,
}

struct Watched {
    qid: Qid,
    model: AppModel,
    /// v2 executions stream their response; legacy ones only their ray
    stream_output: bool,
}

/// Coalescing notifier between the dispatcher and the bus.
#[derive(Clone)]
pub struct UpdatePublisher {
    bus: Arc<Publisher>,
    resources: ResourceStore,
    state: Arc<Mutex<PubState>>,
    cancel: CancellationToken,
}

impl UpdatePublisher {
    pub fn new(bus: Arc<Publisher>, resources: ResourceStore) -> Self {
        Self {
            bus,
            resources,
            state: Arc::new(Mutex::new(PubState {
                pending_ray: None,
                watched: None,
                last_ray_sent: None,
                last_output_hash: None,
            })),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn the tick loop on the current runtime.
    pub fn start(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = tokio::time::sleep(PUBLISH_PERIOD) => this.tick(),
                }
            }
        });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Queue a one-off ray snapshot for the next tick.
    pub fn push_ray(&self, ray: Ray) {
        self.state.lock().pending_ray = Some(ray);
    }

    /// Start watching an execution's model. The first tick emits the
    /// current ray; the response as it stands at attach time (the empty
    /// container) is the baseline, so only actual writes stream.
    pub fn attach(&self, model: &AppModel, stream_output: bool) {
        let mut state = self.state.lock();
        state.last_ray_sent = None;
        state.last_output_hash = Some(canonical_hash(&model.response.snapshot()));
        state.watched =
            Some(Watched { qid: model.qid(), model: model.clone(), stream_output });
    }

    /// Stop watching. Pending one-off snapshots still drain.
    pub fn detach(&self) {
        self.state.lock().watched = None;
    }

    /// Cancel path: stop watching AND drop anything queued, so no further
    /// update for the dying execution reaches the supervisor.
    pub fn silence(&self) {
        let mut state = self.state.lock();
        state.watched = None;
        state.pending_ray = None;
    }

    fn tick(&self) {
        let mut state = self.state.lock();

        if let Some(ray) = state.pending_ray.take() {
            let qid = ray.qid.clone();
            self.publish(UpdatePayload::with_ray(qid, ray));
        }

        let (qid, model, stream_output) = match &state.watched {
            Some(w) => (w.qid.clone(), w.model.clone(), w.stream_output),
            None => return,
        };

        let ray = model.ray.snapshot();
        if state.last_ray_sent != Some(ray.updated_at) {
            state.last_ray_sent = Some(ray.updated_at);
            self.publish(UpdatePayload::with_ray(qid.clone(), ray));
        }

        if !stream_output {
            return;
        }
        let output = model.response.snapshot();
        let hash = canonical_hash(&output);
        if state.last_output_hash.as_deref() != Some(hash.as_str()) {
            state.last_output_hash = Some(hash);
            // Serialize under the execution scope so resource names the
            // output references exist before the supervisor reads them.
            let _scope = self.resources.scope(&qid);
            self.publish(UpdatePayload::with_partial(qid, output));
        }
    }

    fn publish(&self, payload: UpdatePayload) {
        if let Err(e) = self.bus.publish_action(&Action::Update(payload)) {
            warn!(error = %e, "failed to publish update");
        }
    }
}

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
