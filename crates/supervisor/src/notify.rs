// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam between the supervisor and the serving layer's client sessions.

use rh_core::Sid;
use serde_json::Value;

/// Adapter for pushing events to connected client sessions.
///
/// Implemented by the WebSocket layer; `emit` targets one session's room,
/// `broadcast` reaches every connected session.
pub trait SessionNotifier: Send + Sync + 'static {
    fn emit(&self, event: &str, data: Value, room: &Sid);

    fn broadcast(&self, event: &str, data: Value);
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::SessionNotifier;
    use parking_lot::Mutex;
    use rh_core::Sid;
    use serde_json::Value;
    use std::sync::Arc;

    /// One recorded emission.
    #[derive(Debug, Clone)]
    pub struct Emission {
        pub event: String,
        pub data: Value,
        /// None for broadcasts
        pub room: Option<Sid>,
    }

    /// Recording notifier for tests.
    #[derive(Clone, Default)]
    pub struct FakeSessionNotifier {
        inner: Arc<Mutex<Vec<Emission>>>,
    }

    impl FakeSessionNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// All recorded emissions so far.
        pub fn emissions(&self) -> Vec<Emission> {
            self.inner.lock().clone()
        }

        /// Recorded emissions of one event kind.
        pub fn of_kind(&self, event: &str) -> Vec<Emission> {
            self.inner.lock().iter().filter(|e| e.event == event).cloned().collect()
        }
    }

    impl SessionNotifier for FakeSessionNotifier {
        fn emit(&self, event: &str, data: Value, room: &Sid) {
            self.inner.lock().push(Emission {
                event: event.to_string(),
                data,
                room: Some(room.clone()),
            });
        }

        fn broadcast(&self, event: &str, data: Value) {
            self.inner.lock().push(Emission {
                event: event.to_string(),
                data,
                room: None,
            });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{Emission, FakeSessionNotifier};
