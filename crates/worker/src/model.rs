// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution model shared between the user callback and the runtime.
//!
//! The callback may run for minutes while the update publisher ticks every
//! 100 ms, so the ray and the response live behind their own locks and no
//! lock is ever held across the callback itself.

use parking_lot::Mutex;
use rh_core::{Bar, MessageKind, Qid, Ray, RayStatus, State};
use serde_json::Value;
use std::sync::Arc;

/// Shared handle to the ray of the running execution.
#[derive(Clone)]
pub struct SharedRay(Arc<Mutex<Ray>>);

impl SharedRay {
    pub fn new(ray: Ray) -> Self {
        Self(Arc::new(Mutex::new(ray)))
    }

    pub fn qid(&self) -> Qid {
        self.0.lock().qid.clone()
    }

    /// Clone the current ray state.
    pub fn snapshot(&self) -> Ray {
        self.0.lock().clone()
    }

    /// Run a closure against the ray under its lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Ray) -> R) -> R {
        f(&mut self.0.lock())
    }

    pub fn set_status(&self, status: RayStatus) {
        self.0.lock().set_status(status);
    }

    /// Advance a named progress bar.
    pub fn progress(&self, name: &str, step: u64, total: u64) -> Bar {
        self.0.lock().progress(name, step, total)
    }

    /// Append to the ray's message log.
    pub fn message(&self, kind: MessageKind, content: impl Into<String>) {
        self.0.lock().message(kind, content);
    }

    /// Mark a bar (the default bar if `None`) done and the ray finished.
    pub fn complete(&self, name: Option<&str>) {
        self.0.lock().complete(name);
    }

    pub fn finished(&self) -> bool {
        self.0.lock().finished
    }
}

/// Shared handle to a JSON payload (request or response).
#[derive(Clone)]
pub struct SharedValue(Arc<Mutex<Value>>);

impl SharedValue {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    pub fn snapshot(&self) -> Value {
        self.0.lock().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.lock() = value;
    }

    /// Run a closure against the payload under its lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.0.lock())
    }
}

/// Everything a v2 callback sees: the ray, the process state, the request
/// it is answering, and the response it builds up. Writing to `response`
/// is what feeds the partial-output stream.
#[derive(Clone)]
pub struct AppModel {
    pub ray: SharedRay,
    pub state: State,
    pub request: SharedValue,
    pub response: SharedValue,
}

impl AppModel {
    pub fn new(ray: Ray, state: State, request: Value, empty_response: Value) -> Self {
        Self {
            ray: SharedRay::new(ray),
            state,
            request: SharedValue::new(request),
            response: SharedValue::new(empty_response),
        }
    }

    pub fn qid(&self) -> Qid {
        self.ray.qid()
    }
}
