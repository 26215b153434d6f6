// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ray: the control-plane record of one job execution.

use crate::ids::{Qid, Rid, Sid, Uid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Status of a ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RayStatus {
    /// Accepted and staged, waiting for the worker
    Queued,
    /// Popped from the queue, not yet running
    Pending,
    /// The user callback is executing
    Running,
    /// Finished successfully
    Completed,
    /// Cancelled while in flight
    Canceled,
    /// Deleted before it ever started
    Removed,
    /// Execution raised an error
    Failed,
    /// Not yet assigned
    Unknown,
}

impl RayStatus {
    /// Terminal statuses admit no further execution for this qid.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RayStatus::Completed | RayStatus::Canceled | RayStatus::Removed | RayStatus::Failed
        )
    }
}

crate::simple_display! {
    RayStatus {
        Queued => "queued",
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Canceled => "canceled",
        Removed => "removed",
        Failed => "failed",
        Unknown => "unknown",
    }
}

/// Severity of a ray message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    MessageKind {
        Info => "INFO",
        Warn => "WARN",
        Error => "ERROR",
    }
}

/// One entry in a ray's ordered message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
}

/// Progress bar state exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Units of progress completed so far (100 once the bar is complete)
    pub percent: f64,
    /// Estimated seconds remaining at the current rate
    pub remaining: f64,
}

impl Default for Bar {
    fn default() -> Self {
        Self { percent: 0.0, remaining: 0.0 }
    }
}

/// Rate bookkeeping behind a named bar. Never serialized; rebuilt from
/// scratch if the ray is reloaded mid-execution.
#[derive(Debug, Clone, PartialEq)]
struct BarTrack {
    total: u64,
    n: u64,
    started: Instant,
}

/// Name of the bar used when the caller does not supply one.
pub const DEFAULT_BAR: &str = "default";

/// The control-plane record of one job.
///
/// A plain record: mutators bump `updated_at`, and interested parties detect
/// changes by comparing timestamps or by being handed an explicit snapshot.
/// The supervisor and the worker each hold their own copy for a qid and
/// reconcile by full replacement ([`Ray::merge_from`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub qid: Qid,
    #[serde(default)]
    pub sid: Option<Sid>,
    #[serde(default)]
    pub uid: Option<Uid>,
    #[serde(default)]
    pub rid: Option<Rid>,
    pub status: RayStatus,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub bars: BTreeMap<String, Bar>,
    #[serde(skip)]
    trackers: BTreeMap<String, BarTrack>,
}

impl Ray {
    pub fn new(qid: Qid) -> Self {
        let now = Utc::now();
        let mut bars = BTreeMap::new();
        bars.insert(DEFAULT_BAR.to_string(), Bar::default());
        Self {
            qid,
            sid: None,
            uid: None,
            rid: None,
            status: RayStatus::Unknown,
            finished: false,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            bars,
            trackers: BTreeMap::new(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Set the status, bumping `updated_at`.
    pub fn set_status(&mut self, status: RayStatus) {
        self.status = status;
        self.touch();
    }

    /// Append to the ordered message log.
    pub fn message(&mut self, kind: MessageKind, content: impl Into<String>) {
        self.messages.push(Message { kind, content: content.into() });
        self.touch();
    }

    pub fn clear_messages(&mut self) {
        if !self.messages.is_empty() {
            self.messages.clear();
            self.touch();
        }
    }

    /// Advance the named bar by `step` out of `total` units.
    ///
    /// `percent` carries the unit count and `remaining` the estimated
    /// seconds left at the observed rate. Returns the updated bar.
    pub fn progress(&mut self, name: &str, step: u64, total: u64) -> Bar {
        let track = self
            .trackers
            .entry(name.to_string())
            .or_insert_with(|| BarTrack { total, n: 0, started: Instant::now() });
        track.total = total;
        track.n = track.n.saturating_add(step);

        let elapsed = track.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { track.n as f64 / elapsed } else { 0.0 };
        let remaining = if rate > 0.0 && track.total > track.n {
            (track.total - track.n) as f64 / rate
        } else {
            0.0
        };

        let bar = Bar { percent: track.n as f64, remaining: remaining.max(0.0) };
        self.bars.insert(name.to_string(), bar);
        self.touch();
        bar
    }

    /// Mark the named bar (default bar if `None`) done and the ray finished.
    pub fn complete(&mut self, name: Option<&str>) {
        let name = name.unwrap_or(DEFAULT_BAR);
        self.bars.insert(name.to_string(), Bar { percent: 100.0, remaining: 0.0 });
        self.finished = true;
        self.touch();
    }

    /// Replace everything but identity (`qid`/`sid`/`uid`/`rid`) with the
    /// contents of `other`. Identity fields are only filled where this side
    /// has none, so an UPDATE from the worker never erases who asked.
    pub fn merge_from(&mut self, other: &Ray) {
        if self.sid.is_none() {
            self.sid = other.sid.clone();
        }
        if self.uid.is_none() {
            self.uid = other.uid.clone();
        }
        if self.rid.is_none() {
            self.rid = other.rid.clone();
        }
        self.status = other.status;
        self.finished = other.finished;
        self.created_at = other.created_at;
        self.messages = other.messages.clone();
        self.bars = other.bars.clone();
        self.touch();
    }
}

#[cfg(test)]
#[path = "ray_tests.rs"]
mod tests;
