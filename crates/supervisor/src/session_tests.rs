// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn register_and_unregister_session() {
    let link = SessionLink::new();
    let sid = Sid::new("s1");
    assert!(!link.is_active(&sid));
    link.register_session(sid.clone());
    assert!(link.is_active(&sid));
    link.unregister_session(&sid);
    assert!(!link.is_active(&sid));
}

#[test]
fn user_sessions_accumulate() {
    let link = SessionLink::new();
    let uid = Uid::new("u1");
    link.register_user_session(uid.clone(), Sid::new("s1"));
    link.register_user_session(uid.clone(), Sid::new("s2"));
    let mut sids = link.user_sessions(&uid);
    sids.sort();
    assert_eq!(sids, vec![Sid::new("s1"), Sid::new("s2")]);
}

#[test]
fn unregister_user_session_drops_empty_users() {
    let link = SessionLink::new();
    let uid = Uid::new("u1");
    link.register_user_session(uid.clone(), Sid::new("s1"));
    link.unregister_user_session(&uid, &Sid::new("s1"));
    assert!(link.user_sessions(&uid).is_empty());
}

#[test]
fn unregister_session_scrubs_user_links() {
    let link = SessionLink::new();
    let uid = Uid::new("u1");
    let sid = Sid::new("s1");
    link.register_session(sid.clone());
    link.register_user_session(uid.clone(), sid.clone());
    link.register_user_session(Uid::new("u2"), sid.clone());

    link.unregister_session(&sid);
    assert!(link.user_sessions(&uid).is_empty());
    assert!(link.user_sessions(&Uid::new("u2")).is_empty());
}

#[test]
fn unknown_user_has_no_sessions() {
    let link = SessionLink::new();
    assert!(link.user_sessions(&Uid::new("ghost")).is_empty());
}
