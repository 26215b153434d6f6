// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job asset store: `executions/<qid>/{in,out,ray}.json`.

use crate::StorageError;
use rh_core::Qid;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

/// The three persistent blobs of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Serialized request body
    In,
    /// Serialized (possibly partial) response
    Out,
    /// Serialized ray
    Ray,
}

impl AssetKind {
    fn file_name(&self) -> &'static str {
        match self {
            AssetKind::In => "in.json",
            AssetKind::Out => "out.json",
            AssetKind::Ray => "ray.json",
        }
    }
}

/// Asset store rooted at an explicit datastore directory.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn executions_dir(&self) -> PathBuf {
        self.root.join("executions")
    }

    fn asset_path(&self, qid: &Qid, kind: AssetKind) -> PathBuf {
        self.executions_dir().join(qid.as_str()).join(kind.file_name())
    }

    /// Write an asset, creating the qid directory as needed.
    pub fn set(&self, qid: &Qid, kind: AssetKind, value: &Value) -> Result<(), StorageError> {
        let path = self.asset_path(qid, kind);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec(value)?)?;
        Ok(())
    }

    /// Read an asset. Missing or unreadable files come back as `None`; a
    /// corrupt file is logged but never fatal.
    pub fn get(&self, qid: &Qid, kind: AssetKind) -> Option<Value> {
        let path = self.asset_path(qid, kind);
        let data = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to decode asset");
                None
            }
        }
    }

    /// Modification time of an asset in epoch milliseconds, so a watcher can
    /// detect freshness without hashing.
    pub fn timestamp_ms(&self, qid: &Qid, kind: AssetKind) -> Option<u64> {
        let meta = std::fs::metadata(self.asset_path(qid, kind)).ok()?;
        let mtime = meta.modified().ok()?;
        Some(mtime.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64)
    }

    /// Remove every asset of a qid.
    pub fn drop_assets(&self, qid: &Qid) {
        let dir = self.executions_dir().join(qid.as_str());
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to drop assets");
            }
        }
    }

    /// Enumerate qids with persisted assets, for startup recovery.
    pub fn scan_qids(&self) -> Vec<Qid> {
        let mut qids = Vec::new();
        let entries = match std::fs::read_dir(self.executions_dir()) {
            Ok(entries) => entries,
            Err(_) => return qids,
        };
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    qids.push(Qid::new(name));
                }
            }
        }
        qids
    }
}

#[cfg(test)]
#[path = "assets_tests.rs"]
mod tests;
