// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session↔user links for targeted notification fan-out.
//!
//! Nothing here is persisted: after a restart clients reconnect with new
//! sockets and re-register.

use parking_lot::RwLock;
use rh_core::{Sid, Uid};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct Links {
    user_sessions: HashMap<Uid, HashSet<Sid>>,
    sessions: HashSet<Sid>,
}

/// Shared map of active sessions and which user each belongs to.
#[derive(Clone, Default)]
pub struct SessionLink {
    inner: Arc<RwLock<Links>>,
}

impl SessionLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_session(&self, sid: Sid) {
        self.inner.write().sessions.insert(sid);
    }

    /// Drop a session, scrubbing any user links it was part of.
    pub fn unregister_session(&self, sid: &Sid) {
        let mut links = self.inner.write();
        links.sessions.remove(sid);
        links.user_sessions.retain(|_, sids| {
            sids.remove(sid);
            !sids.is_empty()
        });
    }

    pub fn register_user_session(&self, uid: Uid, sid: Sid) {
        self.inner.write().user_sessions.entry(uid).or_default().insert(sid);
    }

    pub fn unregister_user_session(&self, uid: &Uid, sid: &Sid) {
        let mut links = self.inner.write();
        if let Some(sids) = links.user_sessions.get_mut(uid) {
            sids.remove(sid);
            if sids.is_empty() {
                links.user_sessions.remove(uid);
            }
        }
    }

    /// Sessions registered for a user.
    pub fn user_sessions(&self, uid: &Uid) -> Vec<Sid> {
        self.inner
            .read()
            .user_sessions
            .get(uid)
            .map(|sids| sids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_active(&self, sid: &Sid) -> bool {
        self.inner.read().sessions.contains(sid)
    }

    pub fn active_sessions(&self) -> Vec<Sid> {
        self.inner.read().sessions.iter().cloned().collect()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
