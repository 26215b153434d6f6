// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rh-storage: on-disk state for the rayhost runtime.
//!
//! Layout under one datastore root:
//!
//! ```text
//! <root>/executions/<qid>/{in,out,ray}.json   per-job assets
//! <root>/resources/<type>_<encoding>_<hash>   content-addressed blobs
//! <root>/<name>.json                          named key-value stores
//! ```
//!
//! The write contract is write-then-reference: consumers load on demand and
//! tolerate partial or absent files by getting `None` back.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod assets;
mod kv;
mod resources;

pub use assets::{AssetKind, AssetStore};
pub use kv::KvStore;
pub use resources::{content_hash, ExecutionScope, ResourceStore};

use thiserror::Error;

/// Errors from storage writes. Reads degrade to `None` instead.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid resource reference: {0}")]
    InvalidReference(String),
}
