//! Deterministic collaborator implementations for tests and benches.
//!
//! Enabled by the default `test-helpers` feature so integration tests and
//! downstream crates can drive the core without a network or a real
//! transport.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::delivery::Transport;
use crate::error::DispatchError;
use crate::events::OutboundEvent;
use crate::ids::ConnectionId;
use crate::maps::Geocoder;
use crate::spatial::Coordinate;

/// Transport that records every send instead of delivering it. Connections
/// are reachable by default; `kill_connection` makes a handle unreachable to
/// model a dropped socket the registry has not noticed yet.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    state: Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    direct: Vec<(ConnectionId, OutboundEvent)>,
    broadcasts: Vec<(String, OutboundEvent)>,
    dead: HashSet<ConnectionId>,
    transport_down: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill_connection(&self, connection: &ConnectionId) {
        let mut state = self.state.lock().expect("transport state");
        state.dead.insert(connection.clone());
    }

    /// Simulate the transport layer itself going away; broadcasts fail.
    pub fn shut_down(&self) {
        let mut state = self.state.lock().expect("transport state");
        state.transport_down = true;
    }

    pub fn direct_sends(&self) -> Vec<(ConnectionId, OutboundEvent)> {
        self.state.lock().expect("transport state").direct.clone()
    }

    pub fn broadcasts(&self) -> Vec<(String, OutboundEvent)> {
        self.state
            .lock()
            .expect("transport state")
            .broadcasts
            .clone()
    }
}

impl Transport for RecordingTransport {
    fn send_to(&self, connection: &ConnectionId, event: &OutboundEvent) -> bool {
        let mut state = self.state.lock().expect("transport state");
        if state.transport_down || state.dead.contains(connection) {
            return false;
        }
        state.direct.push((connection.clone(), event.clone()));
        true
    }

    fn broadcast(&self, channel: &str, event: &OutboundEvent) -> bool {
        let mut state = self.state.lock().expect("transport state");
        if state.transport_down {
            return false;
        }
        state.broadcasts.push((channel.to_string(), event.clone()));
        true
    }
}

/// Geocoder backed by a fixed address table.
#[derive(Debug, Default)]
pub struct FixedGeocoder {
    table: HashMap<String, Coordinate>,
}

impl FixedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, lat: f64, lng: f64) -> Self {
        let coordinate = Coordinate::new(lat, lng).expect("valid test coordinate");
        self.table.insert(address.to_string(), coordinate);
        self
    }
}

impl Geocoder for FixedGeocoder {
    fn resolve(&self, address: &str) -> Result<Coordinate, DispatchError> {
        self.table
            .get(address)
            .copied()
            .ok_or_else(|| DispatchError::Geocode(format!("unresolvable address: {address}")))
    }
}
