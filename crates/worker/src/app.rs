// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User application callback contracts.
//!
//! Two interface generations exist; the host declares which one it
//! implements at startup instead of the runtime sniffing signatures. New
//! code implements [`App`]; [`LegacyApp`] keeps the original
//! input-in/output-out shape alive for ported applications.

use crate::model::{AppModel, SharedRay};
use rh_core::{Qid, Ray, State};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error surfaced by a user callback. The message ends up on the ray's
/// message log with kind `ERROR`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    pub message: String,
}

impl AppError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

/// JSON schemas describing the app's payload shapes. Published to the
/// supervisor at startup so clients can introspect them.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub config: Option<Value>,
    /// True when the output is a JSON array rather than an object; decides
    /// the empty base the partial stream starts from.
    pub output_many: bool,
}

/// Current application interface. The callback mutates `model.response` as
/// it goes; every write feeds the throttled partial stream.
pub trait App: Send + Sync + 'static {
    fn execute(&self, model: &AppModel) -> Result<(), AppError>;

    /// Cooperative cancellation. Return true to promise the running
    /// `execute` will wind down promptly; false (the default) sends the
    /// worker straight to hara-kiri.
    fn cancel(&self, _ray: &Ray) -> bool {
        false
    }

    /// Called on startup and on every configuration change.
    fn configure(&self, _config: &BTreeMap<String, Value>, _state: &State) {}

    /// Whether the app participates in suspension at all.
    fn suspend_enabled(&self) -> bool {
        false
    }

    /// Asked once the queue has been idle for a full suspend period.
    /// Return true to let the worker sleep.
    fn suspend(&self, _state: &State) -> bool {
        false
    }

    /// How long the queue must stay idle before `suspend` is asked.
    fn suspend_period(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn schemas(&self) -> SchemaSet {
        SchemaSet::default()
    }
}

/// Original application interface: one call, input in, output out.
pub trait LegacyApp: Send + Sync + 'static {
    fn execute(&self, input: Value, ray: &SharedRay, state: &State) -> Result<Value, AppError>;

    fn cancel(&self, _qid: &Qid) -> bool {
        false
    }

    fn configure(&self, _config: &BTreeMap<String, Value>, _state: &State) {}

    fn suspend_enabled(&self) -> bool {
        false
    }

    fn suspend(&self, _state: &State) -> bool {
        false
    }

    fn suspend_period(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn schemas(&self) -> SchemaSet {
        SchemaSet::default()
    }
}

/// The interface variant the hosting binary declared at startup.
#[derive(Clone)]
pub enum ExecutionApi {
    V1(Arc<dyn LegacyApp>),
    V2(Arc<dyn App>),
}

/// Idle period used when suspension is disabled: never, effectively.
const SUSPEND_NEVER: Duration = Duration::from_secs(99_999_999);

/// Uniform host-side view over the two interface variants.
#[derive(Clone)]
pub struct AppHost {
    api: ExecutionApi,
}

impl AppHost {
    pub fn new(api: ExecutionApi) -> Self {
        Self { api }
    }

    /// Whether the app has a partial-output stream (v2 only; a legacy app
    /// produces its output in one piece at the end).
    pub fn streams_output(&self) -> bool {
        matches!(self.api, ExecutionApi::V2(_))
    }

    /// Run the callback. On the legacy path the returned output is copied
    /// into the model so both variants leave the final response there.
    pub fn execute(&self, model: &AppModel) -> Result<Value, AppError> {
        match &self.api {
            ExecutionApi::V1(app) => {
                let output = app.execute(model.request.snapshot(), &model.ray, &model.state)?;
                model.response.set(output.clone());
                Ok(output)
            }
            ExecutionApi::V2(app) => {
                app.execute(model)?;
                Ok(model.response.snapshot())
            }
        }
    }

    pub fn cancel(&self, ray: &Ray) -> bool {
        match &self.api {
            ExecutionApi::V1(app) => app.cancel(&ray.qid),
            ExecutionApi::V2(app) => app.cancel(ray),
        }
    }

    pub fn configure(&self, config: &BTreeMap<String, Value>, state: &State) {
        match &self.api {
            ExecutionApi::V1(app) => app.configure(config, state),
            ExecutionApi::V2(app) => app.configure(config, state),
        }
    }

    pub fn suspend_enabled(&self) -> bool {
        match &self.api {
            ExecutionApi::V1(app) => app.suspend_enabled(),
            ExecutionApi::V2(app) => app.suspend_enabled(),
        }
    }

    /// Whether the app agrees to sleep right now.
    pub fn suspend_allowed(&self, state: &State) -> bool {
        if !self.suspend_enabled() {
            return false;
        }
        match &self.api {
            ExecutionApi::V1(app) => app.suspend(state),
            ExecutionApi::V2(app) => app.suspend(state),
        }
    }

    /// Idle period before suspension is considered, clamped to at least
    /// one second; effectively infinite when suspension is disabled.
    pub fn suspend_period(&self) -> Duration {
        if !self.suspend_enabled() {
            return SUSPEND_NEVER;
        }
        let period = match &self.api {
            ExecutionApi::V1(app) => app.suspend_period(),
            ExecutionApi::V2(app) => app.suspend_period(),
        };
        period.max(Duration::from_secs(1))
    }

    pub fn schemas(&self) -> SchemaSet {
        match &self.api {
            ExecutionApi::V1(app) => app.schemas(),
            ExecutionApi::V2(app) => app.schemas(),
        }
    }

    /// The empty value the partial stream grows from.
    pub fn empty_output(&self) -> Value {
        if self.schemas().output_many {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        }
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
