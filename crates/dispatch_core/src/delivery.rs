//! Notification delivery over an abstract transport.
//!
//! `Transport` is the seam to the connection layer. Both operations report
//! per-target success as a plain `bool` and never panic: `false` means
//! "could not confirm delivery", not a hard failure. No retry or queueing is
//! layered on top; a momentarily offline rider misses the push and reconciles
//! later against persisted state.

use std::sync::Arc;

use crate::events::OutboundEvent;
use crate::identity::IdentityRegistry;
use crate::ids::{ConnectionId, ParticipantId, Role};
use crate::ride::Ride;

pub trait Transport: Send + Sync {
    /// Send one event to one connection. `false` when no live transport
    /// exists for the handle.
    fn send_to(&self, connection: &ConnectionId, event: &OutboundEvent) -> bool;

    /// Send one event to every subscriber of a named channel. `false` only
    /// if the transport layer itself is unavailable.
    fn broadcast(&self, channel: &str, event: &OutboundEvent) -> bool;
}

/// Sends ride transition events to the rider's bound connection, resolved
/// through the registry at the moment of the transition.
pub struct Notifier {
    registry: Arc<IdentityRegistry>,
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(registry: Arc<IdentityRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Direct send to a participant's current connection. Returns `false`
    /// (unconfirmed) when the participant is offline or the send fails.
    pub fn notify(&self, participant: &ParticipantId, role: Role, event: &OutboundEvent) -> bool {
        match self.registry.lookup(participant, role) {
            Some(connection) => {
                let delivered = self.transport.send_to(&connection, event);
                if !delivered {
                    tracing::warn!(
                        participant = %participant,
                        event = event.name,
                        "delivery unconfirmed: connection not reachable"
                    );
                }
                delivered
            }
            None => {
                tracing::debug!(
                    participant = %participant,
                    event = event.name,
                    "delivery unconfirmed: participant offline"
                );
                false
            }
        }
    }

    pub fn ride_accepted(&self, ride: &Ride) -> bool {
        self.notify(&ride.rider, Role::Rider, &OutboundEvent::ride_accepted(ride))
    }

    pub fn ride_started(&self, ride: &Ride) -> bool {
        self.notify(&ride.rider, Role::Rider, &OutboundEvent::ride_started(ride))
    }

    pub fn ride_completed(&self, ride: &Ride) -> bool {
        self.notify(
            &ride.rider,
            Role::Rider,
            &OutboundEvent::ride_completed(ride),
        )
    }
}
