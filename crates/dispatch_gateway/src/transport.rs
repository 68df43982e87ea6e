//! `Transport` implementation on tokio channels.
//!
//! Each live connection owns an unbounded sender feeding its writer task, so
//! a send is a non-blocking channel push and a slow client never delays the
//! caller. Channel (group) membership is a plain set per channel name;
//! drivers are subscribed to the driver channel when they join.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;

use dispatch_core::delivery::Transport;
use dispatch_core::events::OutboundEvent;
use dispatch_core::ids::ConnectionId;

use crate::protocol::ServerFrame;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Mint a process-unique connection handle.
pub fn next_connection_id() -> ConnectionId {
    ConnectionId::new(format!("conn-{}", NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)))
}

#[derive(Default)]
struct TransportInner {
    connections: HashMap<ConnectionId, UnboundedSender<String>>,
    channels: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct ChannelTransport {
    inner: RwLock<TransportInner>,
    down: AtomicBool,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ConnectionId, sender: UnboundedSender<String>) {
        self.inner.write().connections.insert(connection, sender);
    }

    /// Drop the connection and every channel membership it holds.
    pub fn deregister(&self, connection: &ConnectionId) {
        let mut inner = self.inner.write();
        inner.connections.remove(connection);
        for members in inner.channels.values_mut() {
            members.remove(connection);
        }
    }

    pub fn subscribe(&self, channel: &str, connection: ConnectionId) {
        self.inner
            .write()
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(connection);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Tear the transport down; subsequent broadcasts report failure.
    pub fn shut_down(&self) {
        self.down.store(true, Ordering::SeqCst);
        let mut inner = self.inner.write();
        inner.connections.clear();
        inner.channels.clear();
    }

    /// Push a raw frame to one connection, outside the event fan-out path
    /// (request/reply traffic from the session itself).
    pub fn send_frame(&self, connection: &ConnectionId, frame: &ServerFrame) -> bool {
        let inner = self.inner.read();
        match inner.connections.get(connection) {
            Some(sender) => sender.send(frame.to_line()).is_ok(),
            None => false,
        }
    }
}

impl Transport for ChannelTransport {
    fn send_to(&self, connection: &ConnectionId, event: &OutboundEvent) -> bool {
        if self.down.load(Ordering::SeqCst) {
            return false;
        }
        let frame = ServerFrame::new(event.name, event.data.clone());
        self.send_frame(connection, &frame)
    }

    fn broadcast(&self, channel: &str, event: &OutboundEvent) -> bool {
        if self.down.load(Ordering::SeqCst) {
            return false;
        }
        let frame = ServerFrame::new(event.name, event.data.clone());
        let line = frame.to_line();
        let inner = self.inner.read();
        if let Some(members) = inner.channels.get(channel) {
            for connection in members {
                if let Some(sender) = inner.connections.get(connection) {
                    // A dead receiver only affects that member.
                    let _ = sender.send(line.clone());
                }
            }
        }
        true
    }
}
