// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's job loop.
//!
//! One dedicated thread consumes qids in FIFO order and runs the user
//! callback for each; the bus subscriber feeds the queue from the other
//! side through the `on_*` handlers. While a callback runs, nothing else
//! does — serial execution is what makes UPDATE ordering and the
//! last-write-wins contract for `out` hold.

use crate::app::AppHost;
use crate::model::{AppModel, SharedRay, SharedValue};
use crate::publisher::UpdatePublisher;
use crate::WorkerError;
use parking_lot::Mutex;
use rh_core::{MessageKind, Qid, Ray, RayStatus, State};
use rh_storage::{AssetKind, AssetStore, KvStore, ResourceStore};
use rh_wire::{Action, Decoded, Publisher, UpdatePayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const TICK: Duration = Duration::from_millis(100);
const HARA_KIRI_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the dispatcher needs from its process.
pub struct WorkerContext {
    pub assets: AssetStore,
    pub resources: ResourceStore,
    pub config: KvStore,
    pub bus: Arc<Publisher>,
    pub state: Arc<Mutex<State>>,
}

struct Shared {
    queue: VecDeque<Qid>,
    current: Option<Qid>,
}

struct DispatcherInner {
    ctx: WorkerContext,
    host: AppHost,
    notifier: UpdatePublisher,
    shared: Mutex<Shared>,
    running: AtomicBool,
    active_model: Mutex<Option<AppModel>>,
}

/// Single-threaded action dispatcher inside the worker process.
#[derive(Clone)]
pub struct ActionDispatcher {
    inner: Arc<DispatcherInner>,
}

impl ActionDispatcher {
    pub fn new(ctx: WorkerContext, host: AppHost, notifier: UpdatePublisher) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                ctx,
                host,
                notifier,
                shared: Mutex::new(Shared { queue: VecDeque::new(), current: None }),
                running: AtomicBool::new(false),
                active_model: Mutex::new(None),
            }),
        }
    }

    /// Reload configuration and start the job loop thread.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.on_configure();
        let this = self.clone();
        std::thread::Builder::new()
            .name("action_dispatcher".into())
            .spawn(move || this.run_loop())
            .map(|_| ())
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to spawn dispatcher thread");
                self.inner.running.store(false, Ordering::SeqCst);
            });
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Route one decoded bus frame. Called from the subscriber task; must
    /// stay quick for everything except a cooperative cancel callback.
    pub fn handle(&self, decoded: Decoded) {
        match decoded {
            Decoded::Action(Action::Add(qid)) => self.on_add(qid),
            Decoded::Action(Action::Check(qid)) => self.on_add(qid),
            Decoded::Action(Action::Remove(qid)) => self.on_remove(qid),
            Decoded::Action(Action::Sync(qid)) => self.on_sync(&qid),
            Decoded::Action(Action::Configure) => self.on_configure(),
            Decoded::Action(Action::Exit(reason)) => self.on_exit(&reason),
            Decoded::Action(other) => self.on_unsupported_action(tag_of(&other)),
            Decoded::Unsupported(tag) => self.on_unsupported_action(&tag),
            Decoded::Invalid => self.on_invalid_message(),
        }
    }

    /// Append a qid, deduplicated against the current and pending qids.
    fn on_add(&self, qid: Qid) {
        let mut shared = self.inner.shared.lock();
        if shared.current.as_ref() != Some(&qid) && !shared.queue.contains(&qid) {
            shared.queue.push_back(qid);
        }
    }

    /// Drop a qid from the queue; if it is the one running, cancel it.
    fn on_remove(&self, qid: Qid) {
        let was_current = {
            let mut shared = self.inner.shared.lock();
            shared.queue.retain(|q| q != &qid);
            if shared.current.as_ref() == Some(&qid) {
                shared.current = None;
                true
            } else {
                false
            }
        };
        if was_current {
            self.cancel(&qid);
        }
    }

    /// Re-read `in` into the running execution's model.
    fn on_sync(&self, qid: &Qid) {
        if self.inner.shared.lock().current.as_ref() != Some(qid) {
            return;
        }
        let model = self.inner.active_model.lock().clone();
        if let Some(model) = model {
            if let Some(input) = self.inner.ctx.assets.get(qid, AssetKind::In) {
                model.request.set(input);
            }
        }
    }

    /// Re-read the config store and hand it to the app.
    fn on_configure(&self) {
        self.inner.ctx.config.reload();
        let config = self.inner.ctx.config.all();
        let state = self.inner.ctx.state.lock().clone();
        self.inner.host.configure(&config, &state);
    }

    fn on_exit(&self, reason: &str) {
        info!(reason, "worker asked to exit");
        self.inner.running.store(false, Ordering::SeqCst);
    }

    fn on_unsupported_action(&self, tag: &str) {
        debug!(tag, "unsupported action");
    }

    fn on_invalid_message(&self) {
        warn!("message without an action tag");
    }

    /// Cancel the running execution.
    ///
    /// The notifier is silenced before anything else: whatever happens next,
    /// no further updates for this qid may be observed by the supervisor.
    /// The app then gets one chance to wind down cooperatively; refusal, or
    /// failure to do so within the timeout, ends in hara-kiri.
    fn cancel(&self, qid: &Qid) {
        self.inner.notifier.silence();

        let this = self.clone();
        let timer_qid = qid.clone();
        let spawned = std::thread::Builder::new()
            .name("hara_kiri".into())
            .spawn(move || {
                std::thread::sleep(HARA_KIRI_TIMEOUT);
                this.hara_kiri(&timer_qid);
            })
            .is_ok();

        let ray = self.inner.active_model.lock().as_ref().map(|m| m.ray.snapshot());
        let accepted = match ray {
            Some(ray) => self.inner.host.cancel(&ray),
            None => false,
        };
        if !accepted || !spawned {
            // Not implemented or not accepted: no point waiting out the timer.
            self.hara_kiri(qid);
        }
    }

    /// Forced self-termination. Only fires while the given qid is still the
    /// active execution; a callback that already wound down survives.
    fn hara_kiri(&self, qid: &Qid) {
        let still_active =
            self.inner.active_model.lock().as_ref().map(|m| m.qid()) == Some(qid.clone());
        if still_active {
            warn!(qid = %qid, "hara-kiri: cancel was not honored in time");
            self.inner.running.store(false, Ordering::SeqCst);
        }
    }

    fn run_loop(&self) {
        let period = self.inner.host.suspend_period();
        let reset_ticks = period.as_secs().saturating_mul(10);
        let mut ticks = reset_ticks;

        while self.inner.running.load(Ordering::SeqCst) {
            let current = {
                let mut shared = self.inner.shared.lock();
                shared.current = shared.queue.pop_front();
                shared.current.clone()
            };

            if let Some(qid) = current {
                if let Err(e) = self.process(&qid) {
                    error!(qid = %qid, error = %e, "execution failed");
                }
                ticks = reset_ticks;
            } else if ticks == 0 {
                let state = self.inner.ctx.state.lock().clone();
                if self.inner.host.suspend_allowed(&state) {
                    info!("suspend allowed by the application");
                    self.publish(&Action::Exit("suspend".into()));
                    self.inner.running.store(false, Ordering::SeqCst);
                    continue;
                }
                ticks = if self.inner.host.suspend_enabled() { 10 } else { reset_ticks };
                debug!(retry_in_s = ticks / 10, "suspend denied by the application");
            } else {
                ticks -= 1;
            }

            std::thread::sleep(TICK);
        }

        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Run one qid to completion.
    pub fn process(&self, qid: &Qid) -> Result<(), WorkerError> {
        let assets = &self.inner.ctx.assets;

        let Some(ray_value) = assets.get(qid, AssetKind::Ray) else {
            return Ok(());
        };
        let ray: Ray = match serde_json::from_value(ray_value) {
            Ok(ray) => ray,
            Err(e) => {
                warn!(qid = %qid, error = %e, "persisted ray is unreadable");
                return Ok(());
            }
        };

        if ray.finished && ray.status != RayStatus::Removed {
            // Idempotent replay: whatever out was persisted is the answer.
            let mut payload = UpdatePayload::new(qid.clone());
            payload.output = assets.get(qid, AssetKind::Out);
            self.publish(&Action::Update(payload));
            return Ok(());
        }

        info!(qid = %qid, "processing");
        let shared_ray = SharedRay::new(ray);

        let Some(input) = assets.get(qid, AssetKind::In) else {
            let message = format!("process - failed to load input data on request[{qid}]");
            error!("{message}");
            shared_ray.with(|ray| {
                ray.message(MessageKind::Error, &message);
                ray.set_status(RayStatus::Failed);
                ray.complete(None);
            });
            self.publish_final(&shared_ray);
            return Ok(());
        };

        let state = self.inner.ctx.state.lock().clone();
        let model = AppModel {
            ray: shared_ray.clone(),
            state,
            request: SharedValue::new(input),
            response: SharedValue::new(self.inner.host.empty_output()),
        };
        *self.inner.active_model.lock() = Some(model.clone());
        self.inner.notifier.attach(&model, self.inner.host.streams_output());
        shared_ray.set_status(RayStatus::Running);

        let result = self.inner.host.execute(&model);
        self.inner.notifier.detach();

        match result {
            Ok(output) => {
                shared_ray.set_status(RayStatus::Completed);
                if self.cancelled(qid) {
                    self.clear_active();
                    return Ok(());
                }
                // The scope guarantees resource files referenced from out
                // exist before out itself becomes readable.
                let _scope = self.inner.ctx.resources.scope(qid);
                assets.set(qid, AssetKind::Out, &output)?;
            }
            Err(e) => {
                let message = format!("process - failed executing: [{qid}]\n{e}");
                error!("{message}");
                shared_ray.with(|ray| {
                    ray.message(MessageKind::Error, &message);
                    ray.set_status(RayStatus::Failed);
                });
            }
        }

        if self.cancelled(qid) {
            self.clear_active();
            return Ok(());
        }

        shared_ray.complete(None);
        self.publish_final(&shared_ray);
        self.clear_active();
        info!(qid = %qid, "completed");
        Ok(())
    }

    /// The cancel path clears `current`; losing it mid-flight means this
    /// execution's results must not be observed.
    fn cancelled(&self, qid: &Qid) -> bool {
        self.inner.shared.lock().current.as_ref() != Some(qid)
    }

    fn clear_active(&self) {
        *self.inner.active_model.lock() = None;
    }

    fn publish_final(&self, ray: &SharedRay) {
        let snapshot = ray.snapshot();
        self.publish(&Action::Update(UpdatePayload::with_ray(snapshot.qid.clone(), snapshot)));
    }

    fn publish(&self, action: &Action) {
        if let Err(e) = self.inner.ctx.bus.publish_action(action) {
            warn!(error = %e, "failed to publish");
        }
    }
}

fn tag_of(action: &Action) -> &'static str {
    match action {
        Action::Add(_) => "add",
        Action::Check(_) => "check",
        Action::Configure => "configure",
        Action::Exit(_) => "exit",
        Action::Fetch(_) => "fetch",
        Action::Log(_) => "log",
        Action::Remove(_) => "remove",
        Action::AppState(_) => "app_state",
        Action::Update(_) => "update",
        Action::SchemaUpdate(_) => "schema_update",
        Action::Sync(_) => "sync",
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
