// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rh-core: shared types for the rayhost runtime.
//!
//! The control-plane record of a job is a [`Ray`]; everything else here
//! exists to describe, hash, cache, or diff the data that flows around it.

pub mod macros;

pub mod cache;
pub mod clock;
pub mod delta;
pub mod hash;
pub mod ids;
pub mod ray;
pub mod state;

pub use cache::LruCacheMap;
pub use clock::{Clock, FakeClock, SystemClock};
pub use delta::{
    apply, diff, DeltaError, DeltaOp, DeltaPacket, PartialAccumulator, PartialPacket,
};
pub use hash::canonical_hash;
pub use ids::{Qid, Rid, Sid, Uid};
pub use ray::{Bar, Message, MessageKind, Ray, RayStatus};
pub use state::{State, StateStatus};
