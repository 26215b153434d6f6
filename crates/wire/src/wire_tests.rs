// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format tests: envelopes, framing, and the loopback bus.

use super::*;
use rh_core::{Qid, Ray, RayStatus};
use serde_json::json;
use yare::parameterized;

#[test]
fn actions_round_trip() {
    let actions = vec![
        Action::Add(Qid::new("q1")),
        Action::Check(Qid::new("q1")),
        Action::Configure,
        Action::Exit("suspend".into()),
        Action::Fetch("queue".into()),
        Action::Log(LogRecord { level: "INFO".into(), message: "hi".into() }),
        Action::Remove(Qid::new("q1")),
        Action::Sync(Qid::new("q1")),
        Action::SchemaUpdate(SchemaPayload { input: Some(json!({})), ..Default::default() }),
    ];
    for action in actions {
        let bytes = encode(&action).expect("encode failed");
        match decode(&bytes) {
            Decoded::Action(back) => assert_eq!(back, action),
            other => panic!("expected action, got {:?}", other),
        }
    }
}

#[test]
fn update_round_trips_with_ray() {
    let mut ray = Ray::new(Qid::new("q1"));
    ray.set_status(RayStatus::Completed);
    ray.finished = true;
    let action = Action::Update(UpdatePayload::with_ray(Qid::new("q1"), ray));
    let bytes = encode(&action).expect("encode failed");
    let Decoded::Action(Action::Update(payload)) = decode(&bytes) else {
        panic!("expected update");
    };
    assert_eq!(payload.qid, "q1");
    let ray = payload.ray.expect("ray present");
    assert!(ray.finished);
    assert_eq!(ray.status, RayStatus::Completed);
}

#[test]
fn envelope_tag_is_snake_case() {
    let bytes = encode(&Action::SchemaUpdate(SchemaPayload::default())).expect("encode failed");
    let v: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(v["action"], "schema_update");
}

#[test]
fn unknown_action_decodes_as_unsupported() {
    let bytes = br#"{"action": "teleport", "data": "q1"}"#;
    match decode(bytes) {
        Decoded::Unsupported(tag) => assert_eq!(tag, "teleport"),
        other => panic!("expected unsupported, got {:?}", other),
    }
}

#[parameterized(
    no_action_key = { br#"{"data": "q1"}"# as &[u8] },
    not_an_object = { br#"[1, 2]"# },
    not_json = { b"\x00\x01garbage" },
)]
fn malformed_envelopes_decode_as_invalid(payload: &[u8]) {
    assert!(matches!(decode(payload), Decoded::Invalid));
}

#[tokio::test]
async fn frame_round_trip() {
    let original = b"hello world";
    let mut buffer = Vec::new();
    write_frame(&mut buffer, original).await.expect("write failed");

    // 4-byte big-endian length prefix
    assert_eq!(buffer.len(), 4 + original.len());
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let back = read_frame(&mut cursor).await.expect("read failed");
    assert_eq!(back, original);
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
    let mut cursor = std::io::Cursor::new(buffer);
    assert!(matches!(read_frame(&mut cursor).await, Err(WireError::FrameTooLarge(_))));
}

#[tokio::test]
async fn bus_delivers_in_order() {
    let publisher = Publisher::bind(0).await.expect("bind failed");
    let (subscriber, mut rx) = Subscriber::connect(publisher.port());
    assert!(publisher.wait_for_peer(std::time::Duration::from_secs(5)).await);

    for i in 0..10u8 {
        publisher.publish_action(&Action::Add(Qid::new(format!("q{i}")))).expect("publish");
    }
    for i in 0..10u8 {
        let payload = rx.recv().await.expect("frame");
        let Decoded::Action(Action::Add(qid)) = decode(&payload) else {
            panic!("expected add");
        };
        assert_eq!(qid.as_str(), format!("q{i}"));
    }

    subscriber.shutdown();
    publisher.shutdown();
}

#[tokio::test]
async fn subscriber_connects_before_publisher_publishes() {
    // Subscriber retries until the publisher exists; frames published after
    // the peer attaches are not lost.
    let publisher = Publisher::bind(0).await.expect("bind failed");
    let port = publisher.port();
    let (_subscriber, mut rx) = Subscriber::connect(port);
    assert!(publisher.wait_for_peer(std::time::Duration::from_secs(5)).await);
    publisher.publish_action(&Action::Configure).expect("publish");
    let payload =
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv()).await.expect("timeout");
    assert!(matches!(decode(&payload.expect("frame")), Decoded::Action(Action::Configure)));
}
