// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named JSON key-value stores (`<root>/<name>.json`).
//!
//! One flat object per file. Dirty-tracking keeps `flush` a no-op when
//! nothing changed; `reload` picks up writes made by the other process
//! (the supervisor writes `config`, the worker reloads it on `Configure`).

use crate::StorageError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

struct KvInner {
    map: BTreeMap<String, Value>,
    dirty: bool,
}

/// A single named key-value store.
pub struct KvStore {
    path: PathBuf,
    autoflush: bool,
    inner: Mutex<KvInner>,
}

impl KvStore {
    /// Open (or create) `<root>/<name>.json`. A corrupt file is discarded
    /// and recreated empty rather than wedging startup.
    pub fn open(root: impl Into<PathBuf>, name: &str, autoflush: bool) -> Self {
        let path = root.into().join(format!("{name}.json"));
        let map = load(&path);
        Self { path, autoflush, inner: Mutex::new(KvInner { map, dirty: false }) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().map.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        {
            let mut inner = self.inner.lock();
            if inner.map.get(key) != Some(&value) {
                inner.map.insert(key.to_string(), value);
                inner.dirty = true;
            }
        }
        if self.autoflush {
            if let Err(e) = self.flush() {
                warn!(path = %self.path.display(), error = %e, "kv flush failed");
            }
        }
    }

    pub fn remove(&self, key: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.map.remove(key).is_some() {
                inner.dirty = true;
            }
        }
        if self.autoflush {
            if let Err(e) = self.flush() {
                warn!(path = %self.path.display(), error = %e, "kv flush failed");
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().map.keys().cloned().collect()
    }

    pub fn all(&self) -> BTreeMap<String, Value> {
        self.inner.lock().map.clone()
    }

    /// Re-read the backing file, discarding unflushed local changes.
    pub fn reload(&self) {
        let map = load(&self.path);
        let mut inner = self.inner.lock();
        inner.map = map;
        inner.dirty = false;
    }

    /// Persist to disk if anything changed since the last flush.
    pub fn flush(&self) -> Result<(), StorageError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                return Ok(());
            }
            inner.dirty = false;
            inner.map.clone()
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(&snapshot)?)?;
        Ok(())
    }

    /// Modification time of the backing file in epoch milliseconds.
    pub fn mtime_ms(&self) -> Option<u64> {
        let meta = std::fs::metadata(&self.path).ok()?;
        let mtime = meta.modified().ok()?;
        Some(mtime.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64)
    }
}

fn load(path: &Path) -> BTreeMap<String, Value> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_slice(&data) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "kv store corrupted, recreating");
            let _ = std::fs::remove_file(path);
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
