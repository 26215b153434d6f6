// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the supervisor and its worker process.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The
//! payload is a tagged [`Action`] envelope. Transport is a pair of
//! publisher/subscriber endpoints on loopback, one per direction, with no
//! retransmission — every state-changing action is idempotent at the
//! receiver.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod action;
mod bus;
mod frame;

pub use action::{decode, encode, Action, Decoded, LogRecord, SchemaPayload, UpdatePayload};
pub use bus::{Publisher, Subscriber};
pub use frame::{read_frame, write_frame, MAX_FRAME_LEN};

use thiserror::Error;

/// Errors from wire encoding and transport.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame exceeds {MAX_FRAME_LEN} bytes: {0}")]
    FrameTooLarge(usize),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
