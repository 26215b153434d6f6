// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rh-supervisor: the parent-process side of the runtime.
//!
//! The [`Supervisor`] owns the public surface the serving layer calls
//! (prepare / process / cancel / sync / watch), the job queue, the
//! persistent store, and the client notification fan-out. It spawns and
//! re-spawns the worker child process and talks to it over the duplex bus.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod engine;
mod notify;
mod session;
mod supervisor;
mod watch;
mod worker_process;

pub use engine::{Engine, JobRunner};
pub use notify::SessionNotifier;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{Emission, FakeSessionNotifier};
pub use session::SessionLink;
pub use supervisor::{PrepareOptions, Supervisor, SupervisorConfig};
pub use watch::WatchController;
pub use worker_process::{WorkerCommand, WorkerProcess};

use thiserror::Error;

/// Errors from supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("wire error: {0}")]
    Wire(#[from] rh_wire::WireError),

    #[error("storage error: {0}")]
    Storage(#[from] rh_storage::StorageError),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
