// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker binary for the workspace integration specs.
//!
//! Behavior is selected by `RAYHOST_SPECS_APP`; every app appends
//! `start <qid>` / `end <qid>` lines to the file named by
//! `RAYHOST_SPECS_TRACE` so the specs can observe execution counts and
//! ordering from outside the process.

use rh_worker::{run, App, AppError, AppModel, ExecutionApi};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn trace(path: &Option<PathBuf>, line: &str) {
    let Some(path) = path else { return };
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path);
    if let Ok(mut file) = file {
        let _ = writeln!(file, "{line}");
    }
}

fn doubled(model: &AppModel) {
    let x = model.request.snapshot()["x"].as_i64().unwrap_or(0);
    model.response.set(json!({ "y": x * 2 }));
}

/// Doubles `x`. The baseline app.
struct EchoApp {
    trace: Option<PathBuf>,
}

impl App for EchoApp {
    fn execute(&self, model: &AppModel) -> Result<(), AppError> {
        trace(&self.trace, &format!("start {}", model.qid()));
        doubled(model);
        trace(&self.trace, &format!("end {}", model.qid()));
        Ok(())
    }
}

/// Doubles `x` after a 700 ms nap; for FIFO ordering specs.
struct SlowApp {
    trace: Option<PathBuf>,
}

impl App for SlowApp {
    fn execute(&self, model: &AppModel) -> Result<(), AppError> {
        trace(&self.trace, &format!("start {}", model.qid()));
        std::thread::sleep(Duration::from_millis(700));
        doubled(model);
        trace(&self.trace, &format!("end {}", model.qid()));
        Ok(())
    }
}

/// Sleeps ten seconds and refuses cancellation; hara-kiri bait.
struct SleepyApp {
    trace: Option<PathBuf>,
}

impl App for SleepyApp {
    fn execute(&self, model: &AppModel) -> Result<(), AppError> {
        trace(&self.trace, &format!("start {}", model.qid()));
        std::thread::sleep(Duration::from_secs(10));
        trace(&self.trace, &format!("end {}", model.qid()));
        Ok(())
    }
}

/// Streams `items` growing 1 → 1,2 → 1,2,3 with 200 ms gaps.
struct StreamerApp {
    trace: Option<PathBuf>,
}

impl App for StreamerApp {
    fn execute(&self, model: &AppModel) -> Result<(), AppError> {
        trace(&self.trace, &format!("start {}", model.qid()));
        std::thread::sleep(Duration::from_millis(300));
        for n in 1..=3u8 {
            model.response.with(|out| {
                let items = (1..=n).collect::<Vec<_>>();
                *out = json!({ "items": items });
            });
            std::thread::sleep(Duration::from_millis(200));
        }
        trace(&self.trace, &format!("end {}", model.qid()));
        Ok(())
    }
}

/// Doubles `x` and agrees to sleep after one idle second.
struct SuspenderApp {
    trace: Option<PathBuf>,
}

impl App for SuspenderApp {
    fn execute(&self, model: &AppModel) -> Result<(), AppError> {
        trace(&self.trace, &format!("start {}", model.qid()));
        doubled(model);
        trace(&self.trace, &format!("end {}", model.qid()));
        Ok(())
    }

    fn suspend_enabled(&self) -> bool {
        true
    }

    fn suspend(&self, _state: &rh_core::State) -> bool {
        true
    }

    fn suspend_period(&self) -> Duration {
        Duration::from_secs(1)
    }
}

/// Completes its ray, lets the throttler ship the snapshot, then dies
/// without ever returning — the crash-recovery scenario.
struct AbortApp {
    trace: Option<PathBuf>,
}

impl App for AbortApp {
    fn execute(&self, model: &AppModel) -> Result<(), AppError> {
        trace(&self.trace, &format!("start {}", model.qid()));
        model.ray.complete(None);
        std::thread::sleep(Duration::from_millis(400));
        std::process::exit(7);
    }
}

fn main() {
    let behavior = std::env::var("RAYHOST_SPECS_APP").unwrap_or_else(|_| "echo".to_string());
    let trace = std::env::var_os("RAYHOST_SPECS_TRACE").map(PathBuf::from);

    let api = match behavior.as_str() {
        "echo" => ExecutionApi::V2(Arc::new(EchoApp { trace })),
        "slow" => ExecutionApi::V2(Arc::new(SlowApp { trace })),
        "sleepy" => ExecutionApi::V2(Arc::new(SleepyApp { trace })),
        "streamer" => ExecutionApi::V2(Arc::new(StreamerApp { trace })),
        "suspender" => ExecutionApi::V2(Arc::new(SuspenderApp { trace })),
        "abort" => ExecutionApi::V2(Arc::new(AbortApp { trace })),
        other => {
            eprintln!("unknown RAYHOST_SPECS_APP: {other}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(api) {
        eprintln!("worker failed: {e}");
        std::process::exit(1);
    }
}
