// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplex pub/sub bus over loopback TCP.
//!
//! Each process binds a [`Publisher`] and connects a [`Subscriber`] to the
//! peer's publisher port. A publisher fans frames out to every connected
//! peer and drops them silently when nobody is listening or a write fails;
//! a subscriber reconnects forever, which is what lets the supervisor keep
//! one subscriber across worker respawns on a stable port.

use crate::frame::{read_frame, write_frame};
use crate::{encode, Action, WireError};
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Publishing endpoint. Binds immediately; peers come and go.
pub struct Publisher {
    port: u16,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    peers: watch::Receiver<usize>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Bind on 127.0.0.1. Pass port 0 to let the OS pick; the chosen port
    /// is available from [`Publisher::port`].
    pub async fn bind(port: u16) -> Result<Self, WireError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        let (tx, rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = watch::channel(0usize);
        let cancel = CancellationToken::new();
        tokio::spawn(fan_out(listener, rx, peer_tx, cancel.clone()));
        Ok(Self { port, tx, peers: peer_rx, cancel })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queue a raw payload for every connected peer. Fire-and-forget.
    pub fn publish(&self, payload: Vec<u8>) {
        let _ = self.tx.send(payload);
    }

    /// Encode and queue an action.
    pub fn publish_action(&self, action: &Action) -> Result<(), WireError> {
        self.publish(encode(action)?);
        Ok(())
    }

    /// Wait until at least one peer is connected, or the timeout elapses.
    /// Mitigates the slow-joiner race for startup handshakes.
    pub async fn wait_for_peer(&self, timeout: Duration) -> bool {
        let mut peers = self.peers.clone();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            if *peers.borrow() > 0 {
                return true;
            }
            tokio::select! {
                _ = &mut deadline => return false,
                changed = peers.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn fan_out(
    listener: TcpListener,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    peer_tx: watch::Sender<usize>,
    cancel: CancellationToken,
) {
    let mut peers: Vec<OwnedWriteHalf> = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        trace!(%addr, "bus peer connected");
                        let (_, writer) = stream.into_split();
                        peers.push(writer);
                        let _ = peer_tx.send(peers.len());
                    }
                    Err(e) => warn!(error = %e, "bus accept failed"),
                }
            }
            payload = rx.recv() => {
                let Some(payload) = payload else { break };
                let mut alive = Vec::with_capacity(peers.len());
                for mut writer in peers.drain(..) {
                    match write_frame(&mut writer, &payload).await {
                        Ok(()) => alive.push(writer),
                        // Dead peer: drop it, no retransmission.
                        Err(e) => debug!(error = %e, "bus peer dropped"),
                    }
                }
                peers = alive;
                let _ = peer_tx.send(peers.len());
            }
        }
    }
}

/// Subscribing endpoint: connects to a peer publisher and delivers raw
/// frame payloads in FIFO order on the returned channel.
pub struct Subscriber {
    cancel: CancellationToken,
}

impl Subscriber {
    /// Connect to the peer's publisher on 127.0.0.1. Retries until the
    /// peer binds, and reconnects after the peer goes away.
    pub fn connect(port: u16) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(pump(port, tx, cancel.clone()));
        (Self { cancel }, rx)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump(port: u16, tx: mpsc::UnboundedSender<Vec<u8>>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = TcpStream::connect(("127.0.0.1", port)) => connected,
        };
        match stream {
            Ok(mut stream) => {
                trace!(port, "bus subscriber connected");
                loop {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => return,
                        frame = read_frame(&mut stream) => frame,
                    };
                    match frame {
                        Ok(payload) => {
                            if tx.send(payload).is_err() {
                                return;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
            Err(_) => {}
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
