// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rh-worker: the child process that runs the user callback.
//!
//! A worker binary is a user crate that links this one, implements [`App`]
//! (or [`LegacyApp`]) and hands it to [`run`]. The supervisor spawns that
//! binary, feeds it qids over the bus, and the [`dispatcher`] here executes
//! them one at a time, streaming throttled ray and partial-output updates
//! back.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod app;
mod dispatcher;
mod logging;
mod model;
mod publisher;
mod runtime;

pub use app::{App, AppError, AppHost, ExecutionApi, LegacyApp, SchemaSet};
pub use dispatcher::{ActionDispatcher, WorkerContext};
pub use logging::BusLogLayer;
pub use model::{AppModel, SharedRay, SharedValue};
pub use publisher::UpdatePublisher;
pub use runtime::{run, run_with, WorkerOpts};

use thiserror::Error;

/// Errors from worker startup and shutdown.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("wire error: {0}")]
    Wire(#[from] rh_wire::WireError),

    #[error("storage error: {0}")]
    Storage(#[from] rh_storage::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
