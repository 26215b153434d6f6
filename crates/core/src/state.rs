// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-level application state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a supervisor or worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStatus {
    /// Booting; the user app has not finished loading
    Starting,
    /// Serving
    Running,
    /// Worker suspended to sleep; respawned on the next inbound work
    Paused,
    /// The user app failed to start
    Crashed,
}

crate::simple_display! {
    StateStatus {
        Starting => "starting",
        Running => "running",
        Paused => "paused",
        Crashed => "crashed",
    }
}

/// Process state. One per supervisor; mirrored in the worker for its
/// suspend logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub status: StateStatus,
    pub started_at: DateTime<Utc>,
}

impl State {
    pub fn new() -> Self {
        Self { status: StateStatus::Starting, started_at: Utc::now() }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
