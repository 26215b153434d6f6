// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for the runtime.
//!
//! All four are opaque strings. A [`Qid`] may be minted by the runtime or
//! supplied by the caller (re-prepare with the same qid must be idempotent),
//! so none of these impose a fixed format.

crate::define_key! {
    /// Queue id: the stable primary key of a [`crate::Ray`].
    pub struct Qid;
}

crate::define_key! {
    /// Session id: a client's socket session.
    pub struct Sid;
}

crate::define_key! {
    /// User id.
    pub struct Uid;
}

crate::define_key! {
    /// Request id: per-submission correlation id used by client helpers.
    pub struct Rid;
}

impl Qid {
    /// Mint a fresh qid: 32 lowercase hex characters.
    pub fn mint() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
