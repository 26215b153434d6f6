// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed resource store with a per-execution override scope.
//!
//! Blobs normally land in `resources/` under a `<type>_<encoding>_<hash>`
//! name. While an execution scope is held for a qid, writes are redirected
//! into that qid's execution directory, so cancelling the job also
//! garbage-collects its interim resources. The scope is re-entrant within a
//! thread and exclusive across threads: output serialization and resource
//! writes for the same qid interleave freely, but only one qid holds the
//! scope at a time.

use crate::StorageError;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rh_core::Qid;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

const RESOURCES_DIR: &str = "resources";

/// SHA-256 hex digest of raw content, for building resource names.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

struct ResourceInner {
    root: PathBuf,
    // Stack of active scope qids; last one wins. RefCell is sound here
    // because the ReentrantMutex serializes access across threads.
    scope: ReentrantMutex<RefCell<Vec<Qid>>>,
}

/// Resource store rooted at the datastore directory.
#[derive(Clone)]
pub struct ResourceStore {
    inner: Arc<ResourceInner>,
}

/// RAII guard for the per-execution scope. Dropping it restores the
/// previous write location.
pub struct ExecutionScope<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<Vec<Qid>>>,
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.guard.borrow_mut().pop();
    }
}

impl ResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                root: root.into(),
                scope: ReentrantMutex::new(RefCell::new(Vec::new())),
            }),
        }
    }

    /// Acquire the execution scope for a qid. Blocks while another thread
    /// holds it; nests within the same thread.
    pub fn scope(&self, qid: &Qid) -> ExecutionScope<'_> {
        let guard = self.inner.scope.lock();
        guard.borrow_mut().push(qid.clone());
        ExecutionScope { guard }
    }

    fn location(&self) -> String {
        let guard = self.inner.scope.lock();
        let location = match guard.borrow().last() {
            Some(qid) => format!("executions/{qid}"),
            None => RESOURCES_DIR.to_string(),
        };
        location
    }

    /// Store a blob under its content-addressed name, returning the
    /// `<name>/<location>` reference clients use to fetch it back.
    pub fn write(
        &self,
        data: &[u8],
        hash: &str,
        resource_type: &str,
        encoding: &str,
    ) -> Result<String, StorageError> {
        // Hold the scope for the whole write so the location cannot flip
        // between path construction and the filesystem write.
        let _guard = self.inner.scope.lock();
        let location = self.location();
        let dir = self.inner.root.join(&location);
        std::fs::create_dir_all(&dir)?;
        let name = format!("{resource_type}_{encoding}_{hash}");
        std::fs::write(dir.join(&name), data)?;
        Ok(format!("{name}/{location}"))
    }

    /// Resolve a resource reference and read it, sniffing the MIME type.
    /// Returns `Ok(None)` when the resource does not exist.
    pub fn read(&self, reid: &str) -> Result<Option<(Vec<u8>, String)>, StorageError> {
        let mut parts: Vec<&str> = reid.split('/').collect();
        if parts.len() < 2 {
            return Err(StorageError::InvalidReference(reid.to_string()));
        }
        // References may not escape the two blob locations (no state.json,
        // no path traversal).
        let location = parts[1];
        if location != "executions" && location != RESOURCES_DIR {
            return Err(StorageError::InvalidReference(reid.to_string()));
        }
        if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
            return Err(StorageError::InvalidReference(reid.to_string()));
        }

        // The name leads the reference; on disk it trails the location.
        parts.rotate_left(1);
        let mut path = self.inner.root.clone();
        for part in &parts {
            path.push(part);
        }

        if !path.exists() {
            warn!(reid, "resource not found");
            return Ok(None);
        }

        let data = std::fs::read(&path)?;
        let mime = if parts.last().map(|n| n.ends_with(".json")).unwrap_or(false) {
            "application/json".to_string()
        } else {
            sniff_mime(&data).to_string()
        };
        Ok(Some((data, mime)))
    }
}

/// Magic-byte MIME detection for the formats the runtime actually serves.
fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(b"\xff\xd8\xff") {
        "image/jpeg"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.starts_with(b"%PDF-") {
        "application/pdf"
    } else if data.starts_with(b"PK\x03\x04") {
        "application/zip"
    } else if std::str::from_utf8(data).is_ok() {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
