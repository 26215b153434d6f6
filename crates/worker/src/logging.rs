// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forwarding of worker log records to the supervisor.
//!
//! Installed as a `tracing` layer next to the usual fmt layer; every event
//! becomes a `Log` action on the bus and is re-logged supervisor-side under
//! the worker's name.

use rh_wire::{Action, LogRecord, Publisher};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Tracing layer that ships events over the bus.
pub struct BusLogLayer {
    bus: Arc<Publisher>,
}

impl BusLogLayer {
    pub fn new(bus: Arc<Publisher>) -> Self {
        Self { bus }
    }
}

impl<S: tracing::Subscriber> Layer<S> for BusLogLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // The bus logs its own sends; forwarding those would feed back.
        if meta.target().starts_with("rh_wire") {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if visitor.message.is_empty() {
            return;
        }
        let record =
            LogRecord { level: meta.level().to_string(), message: visitor.message };
        let _ = self.bus.publish_action(&Action::Log(record));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
