// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed action envelopes for the supervisor↔worker bus.

use rh_core::{Qid, Ray, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WireError;

/// One forwarded worker log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
}

/// State carried by an `Update` action: any subset of the per-qid assets.
///
/// `partial` is a raw output snapshot; delta encoding against a watcher's
/// accumulated base happens supervisor-side, because deltas are per-watcher
/// state and the bus payload must stay watcher-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub qid: Qid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ray: Option<Ray>,
}

impl UpdatePayload {
    pub fn new(qid: Qid) -> Self {
        Self { qid, input: None, output: None, partial: None, ray: None }
    }

    pub fn with_ray(qid: Qid, ray: Ray) -> Self {
        Self { ray: Some(ray), ..Self::new(qid) }
    }

    pub fn with_output(qid: Qid, output: Value) -> Self {
        Self { output: Some(output), ..Self::new(qid) }
    }

    pub fn with_partial(qid: Qid, partial: Value) -> Self {
        Self { partial: Some(partial), ..Self::new(qid) }
    }
}

/// JSON schemas describing the app's payload shapes, as published by the
/// worker at startup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// Everything that travels over the bus, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum Action {
    /// Enqueue a qid at the worker (idempotent: dedupes against the
    /// current and pending qids)
    Add(Qid),
    /// Liveness re-add issued while the supervisor waits on a qid
    Check(Qid),
    /// Configuration changed; the worker re-reads the config store
    Configure,
    /// One side is going away, with a reason (`"suspend"` for sleep)
    Exit(String),
    /// Worker asks the supervisor to re-send state (`"queue"`)
    Fetch(String),
    /// Forwarded worker log record
    Log(LogRecord),
    /// Drop a qid from the queue, cancelling it if it is running
    Remove(Qid),
    /// Worker process state handshake
    AppState(State),
    /// Asset state flowing back from the worker
    Update(UpdatePayload),
    /// Worker-declared payload schemas
    SchemaUpdate(SchemaPayload),
    /// Re-read `in` into the running execution's model
    Sync(Qid),
}

/// Outcome of decoding one inbound frame.
#[derive(Debug)]
pub enum Decoded {
    Action(Action),
    /// The envelope named an action this build does not know
    Unsupported(String),
    /// The envelope had no action tag, or was not an object
    Invalid,
}

/// Serialize an action to its JSON wire form (unframed).
pub fn encode(action: &Action) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(action)?)
}

/// Decode one frame payload. Never fails: malformed input degrades to
/// [`Decoded::Unsupported`] or [`Decoded::Invalid`] so the receiver can
/// route it to its log-only handlers.
pub fn decode(payload: &[u8]) -> Decoded {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(_) => return Decoded::Invalid,
    };
    let tag = match value.get("action").and_then(Value::as_str) {
        Some(tag) => tag.to_string(),
        None => return Decoded::Invalid,
    };
    match serde_json::from_value::<Action>(value) {
        Ok(action) => Decoded::Action(action),
        Err(_) => Decoded::Unsupported(tag),
    }
}
