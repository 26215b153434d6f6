// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn store() -> (tempfile::TempDir, ResourceStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ResourceStore::new(dir.path());
    (dir, store)
}

#[test]
fn write_lands_in_global_resources() {
    let (dir, store) = store();
    let data = b"hello";
    let reid = store.write(data, &content_hash(data), "text", "raw").unwrap();
    assert_eq!(reid, format!("text_raw_{}/resources", content_hash(data)));
    assert!(dir.path().join("resources").join(format!("text_raw_{}", content_hash(data))).exists());
}

#[test]
fn scoped_write_lands_in_the_execution_dir() {
    let (dir, store) = store();
    let qid = Qid::new("q1");
    let data = b"interim";
    let reid = {
        let _scope = store.scope(&qid);
        store.write(data, &content_hash(data), "blob", "raw").unwrap()
    };
    assert!(reid.ends_with("/executions/q1"));
    assert!(dir
        .path()
        .join("executions/q1")
        .join(format!("blob_raw_{}", content_hash(data)))
        .exists());
}

#[test]
fn dropping_the_scope_restores_the_global_location() {
    let (_dir, store) = store();
    {
        let _scope = store.scope(&Qid::new("q1"));
    }
    let data = b"after";
    let reid = store.write(data, &content_hash(data), "text", "raw").unwrap();
    assert!(reid.ends_with("/resources"));
}

#[test]
fn scope_nests_within_a_thread() {
    let (_dir, store) = store();
    let _outer = store.scope(&Qid::new("q1"));
    {
        let _inner = store.scope(&Qid::new("q1"));
        let data = b"nested";
        let reid = store.write(data, &content_hash(data), "t", "r").unwrap();
        assert!(reid.ends_with("/executions/q1"));
    }
    let data = b"outer";
    let reid = store.write(data, &content_hash(data), "t", "r").unwrap();
    assert!(reid.ends_with("/executions/q1"));
}

#[test]
fn read_round_trips_by_reference() {
    let (_dir, store) = store();
    let data = b"payload";
    let reid = store.write(data, &content_hash(data), "text", "raw").unwrap();
    let (back, mime) = store.read(&reid).unwrap().unwrap();
    assert_eq!(back, data);
    assert_eq!(mime, "text/plain");
}

#[test]
fn read_missing_returns_none() {
    let (_dir, store) = store();
    assert!(store.read("text_raw_deadbeef/resources").unwrap().is_none());
}

#[parameterized(
    bad_location = { "name/elsewhere" },
    state_file = { "state.json/." },
    traversal = { "name/resources/.." },
    empty = { "name" },
)]
fn invalid_references_are_rejected(reid: &str) {
    let (_dir, store) = store();
    assert!(matches!(store.read(reid), Err(StorageError::InvalidReference(_))));
}

#[parameterized(
    png = { &b"\x89PNG\r\n\x1a\nrest"[..], "image/png" },
    jpeg = { &b"\xff\xd8\xffrest"[..], "image/jpeg" },
    gif = { &b"GIF89a..."[..], "image/gif" },
    pdf = { &b"%PDF-1.7"[..], "application/pdf" },
    zip = { &b"PK\x03\x04zzz"[..], "application/zip" },
    text = { &b"plain text"[..], "text/plain" },
    binary = { &b"\x00\x01\x02\xff"[..], "application/octet-stream" },
)]
fn mime_sniffing(data: &[u8], expected: &str) {
    assert_eq!(sniff_mime(data), expected);
}

#[test]
fn content_hash_is_sha256_hex() {
    let h = content_hash(b"abc");
    assert_eq!(h, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
}
