// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker child-process lifecycle.
//!
//! The supervisor owns exactly one worker. It is spawned lazily on the
//! first dispatch, detected dead on later ones, and re-spawned then. The
//! bus ports are stable across respawns, so the supervisor's subscriber
//! simply reconnects.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// How to launch the worker binary. The runtime appends the bus ports and
/// the datastore root.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), envs: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// Handle to the (single) worker child process.
pub struct WorkerProcess {
    command: WorkerCommand,
    /// Port the worker binds its publisher on
    worker_publisher_port: u16,
    /// Port of the supervisor's publisher, for the worker's subscriber
    supervisor_publisher_port: u16,
    datastore: PathBuf,
    child: Mutex<Option<Child>>,
}

impl WorkerProcess {
    pub fn new(
        command: WorkerCommand,
        worker_publisher_port: u16,
        supervisor_publisher_port: u16,
        datastore: PathBuf,
    ) -> Self {
        Self {
            command,
            worker_publisher_port,
            supervisor_publisher_port,
            datastore,
            child: Mutex::new(None),
        }
    }

    /// Spawn the worker if it is not running. Returns true when a fresh
    /// process was started. Must be called from within a tokio runtime.
    pub fn ensure_running(&self) -> bool {
        let mut child = self.child.lock();
        let alive = match child.as_mut() {
            Some(c) => c.try_wait().map(|status| status.is_none()).unwrap_or(false),
            None => false,
        };
        if alive {
            return false;
        }

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg("--publisher-port")
            .arg(self.worker_publisher_port.to_string())
            .arg("--subscriber-port")
            .arg(self.supervisor_publisher_port.to_string())
            .arg("--datastore")
            .arg(&self.datastore)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (key, value) in &self.command.envs {
            cmd.env(key, value);
        }

        match cmd.spawn() {
            Ok(spawned) => {
                info!(program = %self.command.program.display(), "worker spawned");
                *child = Some(spawned);
                true
            }
            Err(e) => {
                warn!(program = %self.command.program.display(), error = %e,
                      "failed to spawn worker");
                *child = None;
                false
            }
        }
    }

    /// True when a child exists and has not exited.
    pub fn is_alive(&self) -> bool {
        let mut child = self.child.lock();
        match child.as_mut() {
            Some(c) => c.try_wait().map(|status| status.is_none()).unwrap_or(false),
            None => false,
        }
    }

    /// Kill the child, if any. The next dispatch respawns it.
    pub fn kill(&self) {
        if let Some(mut c) = self.child.lock().take() {
            if let Err(e) = c.start_kill() {
                warn!(error = %e, "failed to kill worker");
            }
        }
    }
}
