// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: public surface, queue owner, worker lifecycle, inbound
//! action routing, and client fan-out.

use crate::engine::{Engine, JobRunner};
use crate::notify::SessionNotifier;
use crate::session::SessionLink;
use crate::watch::WatchController;
use crate::worker_process::{WorkerCommand, WorkerProcess};
use crate::SupervisorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rh_core::{Qid, Ray, RayStatus, Rid, Sid, State, StateStatus, SystemClock, Uid};
use rh_storage::{AssetKind, AssetStore, KvStore, ResourceStore};
use rh_wire::{
    Action, Decoded, LogRecord, Publisher, SchemaPayload, Subscriber, UpdatePayload,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const WAIT_TICK: Duration = Duration::from_millis(100);
/// Ticks between CHECK re-publishes while waiting on a qid.
const CHECK_EVERY: u64 = 10;

/// Supervisor construction parameters.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Datastore root (assets, resources, kv stores)
    pub datastore: PathBuf,
    /// How to launch the worker binary
    pub worker: WorkerCommand,
    /// When false the worker process is managed externally (tests drive
    /// the bus directly) and dispatch never spawns anything.
    pub spawn_worker: bool,
}

impl SupervisorConfig {
    pub fn new(datastore: impl Into<PathBuf>, worker: WorkerCommand) -> Self {
        Self { datastore: datastore.into(), worker, spawn_worker: true }
    }
}

/// Identity attached to a prepared job.
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub qid: Option<Qid>,
    pub sid: Option<Sid>,
    pub uid: Option<Uid>,
    pub rid: Option<Rid>,
}

/// Parent-process coordinator. One per application.
pub struct Supervisor<N: SessionNotifier> {
    state: Mutex<State>,
    engine: Arc<Engine<SystemClock>>,
    assets: AssetStore,
    resources: ResourceStore,
    config_store: KvStore,
    manifest: KvStore,
    bus: Arc<Publisher>,
    subscriber: Subscriber,
    worker: WorkerProcess,
    spawn_worker: bool,
    worker_publisher_port: u16,
    notifier: Arc<Mutex<Option<Arc<N>>>>,
    sessions: SessionLink,
    watch: WatchController<N>,
    schemas: Mutex<SchemaPayload>,
}

impl<N: SessionNotifier> Supervisor<N> {
    /// Bind the bus, seed the engine from disk, and start the job loop.
    /// The worker is spawned lazily on the first dispatch.
    pub async fn start(config: SupervisorConfig) -> Result<Arc<Self>, SupervisorError> {
        let bus = Arc::new(Publisher::bind(0).await?);
        let worker_publisher_port = reserve_port()?;
        let (subscriber, mut rx) = Subscriber::connect(worker_publisher_port);

        let assets = AssetStore::new(&config.datastore);
        let resources = ResourceStore::new(&config.datastore);
        let config_store = KvStore::open(&config.datastore, "config", true);
        let manifest = KvStore::open(&config.datastore, "manifest", true);

        let engine = Arc::new(Engine::new(assets.clone(), SystemClock));
        let sessions = SessionLink::new();
        let notifier: Arc<Mutex<Option<Arc<N>>>> = Arc::new(Mutex::new(None));
        let watch = WatchController::new(
            Arc::clone(&engine),
            assets.clone(),
            sessions.clone(),
            Arc::clone(&notifier),
        );

        let worker = WorkerProcess::new(
            config.worker,
            worker_publisher_port,
            bus.port(),
            config.datastore.clone(),
        );

        let supervisor = Arc::new(Self {
            state: Mutex::new(State::new()),
            engine: Arc::clone(&engine),
            assets,
            resources,
            config_store,
            manifest,
            bus,
            subscriber,
            worker,
            spawn_worker: config.spawn_worker,
            worker_publisher_port,
            notifier,
            sessions,
            watch,
            schemas: Mutex::new(SchemaPayload::default()),
        });

        engine.start(Arc::clone(&supervisor) as Arc<dyn JobRunner>);

        let router = Arc::clone(&supervisor);
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                router.handle(rh_wire::decode(&frame));
            }
        });

        supervisor.state.lock().status = StateStatus::Running;
        Ok(supervisor)
    }

    /// Stage a job and queue it for execution. Re-preparing a qid that is
    /// still queued refreshes its assets and nothing else.
    pub async fn prepare(
        &self,
        data: Value,
        opts: PrepareOptions,
    ) -> Result<Qid, SupervisorError> {
        let qid = opts.qid.unwrap_or_else(Qid::mint);
        let ray = self.engine.with_ray(&qid, |ray| {
            ray.set_status(RayStatus::Queued);
            if opts.sid.is_some() {
                ray.sid = opts.sid.clone();
            }
            if opts.uid.is_some() {
                ray.uid = opts.uid.clone();
            }
            if opts.rid.is_some() {
                ray.rid = opts.rid.clone();
            }
            ray.clone()
        });
        self.persist_ray(&ray)?;
        self.assets.set(&qid, AssetKind::In, &data)?;
        self.engine.enqueue(qid.clone());
        self.dispatch(Action::Add(qid.clone()), true).await;
        Ok(qid)
    }

    /// Block until the ray finishes, then return whatever `out` was last
    /// persisted (possibly nothing).
    pub async fn process(&self, qid: &Qid) -> Option<Value> {
        self.wait_finished(qid).await;
        self.assets.get(qid, AssetKind::Out)
    }

    async fn wait_finished(&self, qid: &Qid) {
        let mut ticks = 0u64;
        loop {
            match self.engine.get(qid) {
                None => break,
                Some(ray) if ray.finished => break,
                Some(_) => {}
            }

            // A crashed app never answers; fail every waiting ray.
            if self.state.lock().status == StateStatus::Crashed {
                let ray = self.engine.with_ray(qid, |ray| {
                    ray.set_status(RayStatus::Failed);
                    ray.finished = true;
                    ray.clone()
                });
                if let Err(e) = self.persist_ray(&ray) {
                    warn!(qid = %qid, error = %e, "failed to persist failed ray");
                }
                break;
            }

            tokio::time::sleep(WAIT_TICK).await;
            ticks += 1;
            if ticks % CHECK_EVERY == 0 {
                // Robustness against a restarted worker that lost its
                // queue: CHECK re-adds idempotently.
                self.dispatch(Action::Check(qid.clone()), true).await;
            }
        }
    }

    /// Mark a ray cancelled and tell the worker to drop it.
    pub async fn cancel_execution(&self, qid: &Qid) {
        let ray = self.engine.with_ray(qid, |ray| {
            ray.set_status(RayStatus::Canceled);
            ray.complete(None);
            ray.clone()
        });
        if let Err(e) = self.persist_ray(&ray) {
            warn!(qid = %qid, error = %e, "failed to persist cancelled ray");
        }
        self.dispatch(Action::Remove(qid.clone()), false).await;
    }

    /// Delete a job: queued-but-never-started rays end `Removed`, an
    /// in-flight one goes through the cancel path and ends `Canceled`.
    /// Assets are dropped either way.
    pub async fn delete(&self, qid: &Qid) -> Option<Ray> {
        self.engine.remove_from_queue(qid);
        let existing = self.engine.get(qid);
        let ray = match existing {
            Some(ray) if ray.status == RayStatus::Running => {
                self.cancel_execution(qid).await;
                self.engine.get(qid)
            }
            Some(_) => {
                let ray = self.engine.with_ray(qid, |ray| {
                    ray.set_status(RayStatus::Removed);
                    ray.finished = true;
                    ray.clone()
                });
                self.dispatch(Action::Remove(qid.clone()), false).await;
                Some(ray)
            }
            None => None,
        };
        self.assets.drop_assets(qid);
        self.engine.drop_entry(qid);
        ray
    }

    /// Re-read `in` into the running callback's model, if any.
    pub async fn sync(&self, qid: &Qid) {
        self.dispatch(Action::Sync(qid.clone()), true).await;
    }

    /// Persist new configuration and tell the worker to reload it.
    pub async fn update_config(&self, config: BTreeMap<String, Value>) {
        for (key, value) in config {
            self.config_store.set(&key, value);
        }
        if let Err(e) = self.config_store.flush() {
            warn!(error = %e, "failed to persist config");
        }
        self.dispatch(Action::Configure, false).await;
    }

    /// Publish an action, optionally making sure the worker is alive
    /// first (respawning it when the previous child died).
    pub async fn dispatch(&self, action: Action, start_worker: bool) {
        debug!(?action, "dispatching");
        if start_worker && self.spawn_worker {
            self.worker.ensure_running();
        }
        if let Err(e) = self.bus.publish_action(&action) {
            warn!(error = %e, "failed to publish");
        }
    }

    /// Route one decoded frame from the worker.
    pub fn handle(&self, decoded: Decoded) {
        match decoded {
            Decoded::Action(Action::Fetch(field)) => self.on_fetch(&field),
            Decoded::Action(Action::Update(payload)) => self.on_update(payload),
            Decoded::Action(Action::SchemaUpdate(payload)) => self.on_schema_update(payload),
            Decoded::Action(Action::AppState(state)) => self.on_app_state(state),
            Decoded::Action(Action::Log(record)) => self.on_log(record),
            Decoded::Action(Action::Exit(reason)) => self.on_exit(&reason),
            Decoded::Action(other) => self.on_unsupported_action(&format!("{other:?}")),
            Decoded::Unsupported(tag) => self.on_unsupported_action(&tag),
            Decoded::Invalid => self.on_invalid_message(),
        }
    }

    /// Worker startup asks for state it cannot rediscover on its own.
    fn on_fetch(&self, field: &str) {
        if field != "queue" {
            error!(field, "unknown fetch request");
            return;
        }
        // Re-offer everything still queued; Add is idempotent over there.
        for qid in self.engine.queued() {
            if let Err(e) = self.bus.publish_action(&Action::Add(qid)) {
                warn!(error = %e, "failed to re-offer queued qid");
            }
        }
    }

    /// Asset state flowing back from the worker: write each piece to disk,
    /// reconcile the in-memory ray, fan out to interested sessions.
    fn on_update(&self, payload: UpdatePayload) {
        let qid = payload.qid.clone();
        debug!(qid = %qid, "update");

        if let Some(partial) = payload.partial {
            self.engine.partial_output(&qid, partial);
        }
        if let Some(input) = payload.input {
            if let Err(e) = self.assets.set(&qid, AssetKind::In, &input) {
                warn!(qid = %qid, error = %e, "failed to persist input");
            }
        }
        if let Some(output) = payload.output {
            if let Err(e) = self.assets.set(&qid, AssetKind::Out, &output) {
                warn!(qid = %qid, error = %e, "failed to persist output");
            }
        }

        let ray = match payload.ray {
            Some(remote) => {
                let merged = self.engine.with_ray(&qid, |ray| {
                    ray.merge_from(&remote);
                    ray.clone()
                });
                if let Err(e) = self.persist_ray(&merged) {
                    warn!(qid = %qid, error = %e, "failed to persist ray");
                }
                Some(merged)
            }
            None => self.engine.get(&qid),
        };

        let Some(ray) = ray else { return };
        self.fan_out(&ray);
    }

    /// Emit `response` (on finish) or `progress` to the sessions that care
    /// about this ray: all of its user's sessions, plus the originating
    /// session while it is still connected.
    fn fan_out(&self, ray: &Ray) {
        let notifier = self.notifier.lock().clone();
        let Some(notifier) = notifier else { return };

        let user_sessions =
            ray.uid.as_ref().map(|uid| self.sessions.user_sessions(uid)).unwrap_or_default();
        let origin_active =
            ray.sid.as_ref().map(|sid| self.sessions.is_active(sid)).unwrap_or(false);
        if user_sessions.is_empty() && !origin_active {
            return;
        }

        // A response contains the progress state anyway, so send one or
        // the other, never both.
        let (event, data) = if ray.finished {
            let output = self.assets.get(&ray.qid, AssetKind::Out);
            let output_ts = self.assets.timestamp_ms(&ray.qid, AssetKind::Out);
            ("response", json!({ "output": output, "ray": ray, "output_ts": output_ts }))
        } else {
            ("progress", json!(ray))
        };

        for sid in &user_sessions {
            notifier.emit(event, data.clone(), sid);
        }
        if let Some(sid) = &ray.sid {
            // The origin session gets updates even without a registered
            // user, as long as it is still connected.
            if origin_active && !user_sessions.contains(sid) {
                notifier.emit(event, data, sid);
            }
        }
    }

    /// The worker re-declared its payload schemas; remember and re-emit.
    fn on_schema_update(&self, payload: SchemaPayload) {
        *self.schemas.lock() = payload.clone();
        let notifier = self.notifier.lock().clone();
        if let Some(notifier) = notifier {
            if let Ok(data) = serde_json::to_value(&payload) {
                notifier.broadcast("schema_update", data);
            }
        }
    }

    fn on_app_state(&self, new_state: State) {
        let mut state = self.state.lock();
        info!(from = %state.status, to = %new_state.status, "worker state update");
        state.status = new_state.status;
    }

    fn on_log(&self, record: LogRecord) {
        match record.level.as_str() {
            "ERROR" => error!(target: "worker", "{}", record.message),
            "WARN" => warn!(target: "worker", "{}", record.message),
            "DEBUG" | "TRACE" => debug!(target: "worker", "{}", record.message),
            _ => info!(target: "worker", "{}", record.message),
        }
    }

    fn on_exit(&self, reason: &str) {
        info!(reason, "worker exited");
        self.worker.kill();
        if reason == "suspend" {
            self.state.lock().status = StateStatus::Paused;
        }
    }

    fn on_unsupported_action(&self, tag: &str) {
        debug!(tag, "unsupported action");
    }

    fn on_invalid_message(&self) {
        warn!("message without an action tag");
    }

    fn persist_ray(&self, ray: &Ray) -> Result<(), SupervisorError> {
        self.assets.set(&ray.qid, AssetKind::Ray, &serde_json::to_value(ray)?)?;
        Ok(())
    }

    // -- watch --------------------------------------------------------

    /// Stream partial outputs for a qid to a session.
    pub fn watch(&self, sid: Sid, qid: Qid) {
        self.watch.watch(sid, qid);
    }

    /// Force the next partial for this qid to be a refresh.
    pub fn reset_watch(&self, qid: &Qid) {
        self.watch.reset_watch(qid);
    }

    // -- sessions -----------------------------------------------------

    pub fn sessions(&self) -> &SessionLink {
        &self.sessions
    }

    /// A client went away: drop its session links and its watch.
    pub fn on_disconnect(&self, sid: &Sid) {
        self.sessions.unregister_session(sid);
        self.watch.unwatch(sid);
    }

    // -- accessors ----------------------------------------------------

    pub fn set_notifier(&self, notifier: Arc<N>) {
        *self.notifier.lock() = Some(notifier);
    }

    pub fn engine(&self) -> &Arc<Engine<SystemClock>> {
        &self.engine
    }

    pub fn state(&self) -> State {
        self.state.lock().clone()
    }

    pub fn set_status(&self, status: StateStatus) {
        self.state.lock().status = status;
    }

    pub fn schemas(&self) -> SchemaPayload {
        self.schemas.lock().clone()
    }

    pub fn manifest(&self) -> &KvStore {
        &self.manifest
    }

    pub fn config_store(&self) -> &KvStore {
        &self.config_store
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn worker_alive(&self) -> bool {
        self.worker.is_alive()
    }

    /// (supervisor publisher port, worker publisher port) — for tests
    /// that stand in for the worker on the bus.
    pub fn bus_ports(&self) -> (u16, u16) {
        (self.bus.port(), self.worker_publisher_port)
    }

    /// Stop background tasks and the worker.
    pub fn shutdown(&self) {
        self.engine.stop();
        self.worker.kill();
        self.subscriber.shutdown();
        self.bus.shutdown();
    }
}

#[async_trait]
impl<N: SessionNotifier> JobRunner for Supervisor<N> {
    async fn run(&self, qid: Qid) {
        self.wait_finished(&qid).await;
    }
}

/// Pick a free loopback port for the worker's publisher by binding and
/// immediately releasing it. The worker binds it for real at spawn.
fn reserve_port() -> Result<u16, SupervisorError> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
