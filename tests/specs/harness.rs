// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a supervisor wired to the `specs-worker` binary.

use rh_supervisor::{FakeSessionNotifier, Supervisor, SupervisorConfig, WorkerCommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct Specs {
    pub supervisor: Arc<Supervisor<FakeSessionNotifier>>,
    pub notifier: Arc<FakeSessionNotifier>,
    pub dir: tempfile::TempDir,
    trace_path: PathBuf,
}

/// Start a supervisor whose worker runs the named specs app.
pub async fn boot(app: &str) -> Specs {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let trace_path = dir.path().join("trace.log");

    let worker = WorkerCommand::new(assert_cmd::cargo::cargo_bin("specs-worker"))
        .env("RAYHOST_SPECS_APP", app)
        .env("RAYHOST_SPECS_TRACE", trace_path.to_string_lossy())
        .env("RUST_LOG", "warn");

    let config = SupervisorConfig::new(dir.path(), worker);
    let supervisor = Supervisor::start(config).await.unwrap_or_else(|e| panic!("start: {e}"));
    let notifier = Arc::new(FakeSessionNotifier::new());
    supervisor.set_notifier(Arc::clone(&notifier));

    Specs { supervisor, notifier, dir, trace_path }
}

impl Specs {
    /// Lines the worker appended to its trace file so far.
    pub fn trace(&self) -> Vec<String> {
        std::fs::read_to_string(&self.trace_path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn trace_count(&self, line: &str) -> usize {
        self.trace().iter().filter(|l| l.as_str() == line).count()
    }
}

/// Poll until the condition holds or the timeout elapses; true on success.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
