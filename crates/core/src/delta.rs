// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON delta encoding for the partial-output stream.
//!
//! [`diff`] computes the edit from one output snapshot to the next as a list
//! of add/replace/remove operations at JSON-pointer paths, bracketed by the
//! canonical hashes of both snapshots. [`apply`] folds a packet into an
//! accumulated base on the receiving side; a receiver whose accumulated hash
//! does not match `old_hash` must discard its state and ask for a refresh.

use crate::hash::canonical_hash;
use crate::ids::Qid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from applying a delta to a base value.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("array index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("invalid array index in path: {0}")]
    InvalidIndex(String),

    #[error("cannot descend into scalar at: {0}")]
    NotAContainer(String),

    #[error("accumulated hash {have} does not match packet old_hash {want}")]
    HashMismatch { have: String, want: String },
}

/// One edit operation at a JSON-pointer path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DeltaOp {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

/// The edit from one snapshot to the next, with hashes of both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaPacket {
    pub old_hash: String,
    pub new_hash: String,
    pub ops: Vec<DeltaOp>,
}

/// A delta addressed to one watcher. `refresh` marks the first packet of a
/// watch (base is the empty object or array), after which packets chain:
/// each `old_hash` equals the previous `new_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialPacket {
    pub qid: Qid,
    pub refresh: bool,
    #[serde(flatten)]
    pub delta: DeltaPacket,
}

/// Compute the delta that turns `base` into `target`.
pub fn diff(base: &Value, target: &Value) -> DeltaPacket {
    let mut ops = Vec::new();
    walk("", base, target, &mut ops);
    DeltaPacket {
        old_hash: canonical_hash(base),
        new_hash: canonical_hash(target),
        ops,
    }
}

fn walk(path: &str, base: &Value, target: &Value, ops: &mut Vec<DeltaOp>) {
    match (base, target) {
        (Value::Object(a), Value::Object(b)) => {
            // Removes first so a re-added key reads as remove+add, not a
            // silent overwrite of stale state.
            for key in a.keys() {
                if !b.contains_key(key) {
                    ops.push(DeltaOp::Remove { path: join(path, key) });
                }
            }
            for (key, tv) in b {
                match a.get(key) {
                    Some(bv) => walk(&join(path, key), bv, tv, ops),
                    None => ops.push(DeltaOp::Add { path: join(path, key), value: tv.clone() }),
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for i in 0..common {
                walk(&join_index(path, i), &a[i], &b[i], ops);
            }
            for (i, item) in b.iter().enumerate().skip(common) {
                ops.push(DeltaOp::Add { path: join_index(path, i), value: item.clone() });
            }
            // Tail removes run highest-index-first so each path stays valid
            // while the ones before it are applied.
            for i in (common..a.len()).rev() {
                ops.push(DeltaOp::Remove { path: join_index(path, i) });
            }
        }
        _ => {
            if base != target {
                ops.push(DeltaOp::Replace { path: path.to_string(), value: target.clone() });
            }
        }
    }
}

fn join(path: &str, key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '~' => escaped.push_str("~0"),
            '/' => escaped.push_str("~1"),
            c => escaped.push(c),
        }
    }
    format!("{path}/{escaped}")
}

fn join_index(path: &str, index: usize) -> String {
    format!("{path}/{index}")
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Apply a delta to `base`, yielding the target snapshot.
pub fn apply(base: &Value, packet: &DeltaPacket) -> Result<Value, DeltaError> {
    let mut doc = base.clone();
    for op in &packet.ops {
        apply_op(&mut doc, op)?;
    }
    Ok(doc)
}

fn apply_op(doc: &mut Value, op: &DeltaOp) -> Result<(), DeltaError> {
    let (path, value) = match op {
        DeltaOp::Add { path, value } | DeltaOp::Replace { path, value } => {
            (path.as_str(), Some(value))
        }
        DeltaOp::Remove { path } => (path.as_str(), None),
    };

    if path.is_empty() {
        // Whole-document replace (type changed at the root).
        if let Some(value) = value {
            *doc = value.clone();
            return Ok(());
        }
        return Err(DeltaError::PathNotFound(String::new()));
    }

    let tokens: Vec<String> = path.split('/').skip(1).map(unescape).collect();
    let (last, parents) = match tokens.split_last() {
        Some(split) => split,
        None => return Err(DeltaError::PathNotFound(path.to_string())),
    };

    let mut cursor = doc;
    for token in parents {
        cursor = match cursor {
            Value::Object(map) => map
                .get_mut(token.as_str())
                .ok_or_else(|| DeltaError::PathNotFound(path.to_string()))?,
            Value::Array(items) => {
                let index = parse_index(token, path)?;
                items.get_mut(index).ok_or_else(|| DeltaError::IndexOutOfRange(path.to_string()))?
            }
            _ => return Err(DeltaError::NotAContainer(path.to_string())),
        };
    }

    match (cursor, op) {
        (Value::Object(map), DeltaOp::Add { value, .. })
        | (Value::Object(map), DeltaOp::Replace { value, .. }) => {
            map.insert(last.clone(), value.clone());
        }
        (Value::Object(map), DeltaOp::Remove { .. }) => {
            map.remove(last.as_str());
        }
        (Value::Array(items), DeltaOp::Add { value, .. }) => {
            let index = parse_index(last, path)?;
            if index > items.len() {
                return Err(DeltaError::IndexOutOfRange(path.to_string()));
            }
            items.insert(index, value.clone());
        }
        (Value::Array(items), DeltaOp::Replace { value, .. }) => {
            let index = parse_index(last, path)?;
            let slot =
                items.get_mut(index).ok_or_else(|| DeltaError::IndexOutOfRange(path.to_string()))?;
            *slot = value.clone();
        }
        (Value::Array(items), DeltaOp::Remove { .. }) => {
            let index = parse_index(last, path)?;
            if index >= items.len() {
                return Err(DeltaError::IndexOutOfRange(path.to_string()));
            }
            items.remove(index);
        }
        _ => return Err(DeltaError::NotAContainer(path.to_string())),
    }
    Ok(())
}

fn parse_index(token: &str, path: &str) -> Result<usize, DeltaError> {
    token.parse::<usize>().map_err(|_| DeltaError::InvalidIndex(path.to_string()))
}

/// Receiver-side fold over a partial stream.
///
/// A refresh packet restarts from the empty base; a chained packet is only
/// accepted when its `old_hash` matches the accumulated value, otherwise
/// the caller must clear its state server-side (`reset_watch`) and wait for
/// the refresh that follows.
#[derive(Debug, Default)]
pub struct PartialAccumulator {
    value: Option<Value>,
}

impl PartialAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value accumulated so far.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Fold one packet in, returning the updated value.
    pub fn fold(&mut self, packet: &PartialPacket) -> Result<&Value, DeltaError> {
        let base = if packet.refresh {
            // A refresh is diffed against the empty container of the
            // output's kind; old_hash tells us which one the emitter used.
            let empty_array = Value::Array(Vec::new());
            if packet.delta.old_hash == canonical_hash(&empty_array) {
                empty_array
            } else {
                Value::Object(serde_json::Map::new())
            }
        } else {
            let current = self.value.clone().unwrap_or(Value::Object(serde_json::Map::new()));
            let have = canonical_hash(&current);
            if have != packet.delta.old_hash {
                return Err(DeltaError::HashMismatch {
                    have,
                    want: packet.delta.old_hash.clone(),
                });
            }
            current
        };
        let next = apply(&base, &packet.delta)?;
        Ok(self.value.insert(next))
    }
}

#[cfg(test)]
#[path = "delta_tests.rs"]
mod tests;
