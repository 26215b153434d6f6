// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process entry point.
//!
//! A hosting binary builds its [`ExecutionApi`] and calls [`run`]; the
//! supervisor supplies the ports and the datastore root on the command
//! line, with the publisher/subscriber ports swapped relative to its own.

use crate::app::{AppHost, ExecutionApi};
use crate::dispatcher::{ActionDispatcher, WorkerContext};
use crate::logging::BusLogLayer;
use crate::publisher::UpdatePublisher;
use crate::WorkerError;
use clap::Parser;
use parking_lot::Mutex;
use rh_core::{State, StateStatus};
use rh_storage::{AssetStore, KvStore, ResourceStore};
use rh_wire::{Action, Publisher, SchemaPayload, Subscriber};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Command line of a worker process.
#[derive(Debug, Parser)]
#[command(name = "rayhost-worker", about = "rayhost worker process")]
pub struct WorkerOpts {
    /// Port to bind this worker's publisher on
    #[arg(long)]
    pub publisher_port: u16,

    /// Port of the supervisor's publisher to subscribe to
    #[arg(long)]
    pub subscriber_port: u16,

    /// Datastore root directory
    #[arg(long)]
    pub datastore: PathBuf,
}

/// Parse the command line and run the worker until it exits.
pub fn run(api: ExecutionApi) -> Result<(), WorkerError> {
    run_with(api, WorkerOpts::parse())
}

/// Run the worker with explicit options.
pub fn run_with(api: ExecutionApi, opts: WorkerOpts) -> Result<(), WorkerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run_inner(api, opts))
}

async fn run_inner(api: ExecutionApi, opts: WorkerOpts) -> Result<(), WorkerError> {
    let bus = Arc::new(Publisher::bind(opts.publisher_port).await?);
    let (subscriber, mut rx) = Subscriber::connect(opts.subscriber_port);

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(BusLogLayer::new(bus.clone()))
        .try_init();

    // Slow-joiner mitigation: give the supervisor's subscriber a moment to
    // attach so the startup handshake is not published into the void.
    bus.wait_for_peer(Duration::from_secs(2)).await;

    let state = Arc::new(Mutex::new(State::new()));
    let _ = bus.publish_action(&Action::AppState(state.lock().clone()));

    let assets = AssetStore::new(&opts.datastore);
    let resources = ResourceStore::new(&opts.datastore);
    let config = KvStore::open(&opts.datastore, "config", false);

    let host = AppHost::new(api);
    let notifier = UpdatePublisher::new(bus.clone(), resources.clone());
    let ctx = WorkerContext {
        assets,
        resources,
        config,
        bus: bus.clone(),
        state: state.clone(),
    };
    let dispatcher = ActionDispatcher::new(ctx, host.clone(), notifier.clone());

    state.lock().status = StateStatus::Running;
    let _ = bus.publish_action(&Action::AppState(state.lock().clone()));

    let schemas = host.schemas();
    if schemas.input.is_some() || schemas.output.is_some() || schemas.config.is_some() {
        let _ = bus.publish_action(&Action::SchemaUpdate(SchemaPayload {
            input: schemas.input,
            output: schemas.output,
            config: schemas.config,
        }));
    }

    // Lazy queue rediscovery: the supervisor answers with an Add per
    // still-queued qid.
    let _ = bus.publish_action(&Action::Fetch("queue".into()));

    notifier.start();
    dispatcher.start();

    let route = dispatcher.clone();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            route.handle(rh_wire::decode(&frame));
        }
    });

    info!("started");
    while dispatcher.is_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("exiting");
    notifier.stop();
    subscriber.shutdown();
    bus.shutdown();
    Ok(())
}
