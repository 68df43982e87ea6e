//! Candidate fan-out for newly requested rides.
//!
//! Dispatch is best-effort and fully decoupled from ride creation: the ride
//! is persisted and returned to the rider first, then a `DispatchQueue`
//! worker runs the fan-out. Failures here are logged and counted, never
//! propagated back to the creation caller.
//!
//! Delivery is deliberately duplicated: direct sends to each bound candidate
//! plus a broadcast on the driver channel. The broadcast covers stale or
//! missing bindings (e.g. a lookup racing a reconnect); receivers that see
//! both paths deduplicate by ride id.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::delivery::Transport;
use crate::events::{OutboundEvent, DRIVER_CHANNEL};
use crate::identity::IdentityRegistry;
use crate::ids::Role;
use crate::maps::Geocoder;
use crate::ride::Ride;
use crate::spatial::DriverLocationIndex;

/// Default search distance around the pickup point, in kilometers.
pub const DEFAULT_DISPATCH_RADIUS_KM: f64 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Drivers inside the dispatch radius at notification time.
    pub candidates: usize,
    /// Direct sends confirmed by the transport.
    pub direct_sends: usize,
    /// Whether the redundancy broadcast was accepted by the transport.
    pub broadcast_delivered: bool,
}

pub struct Dispatcher {
    registry: Arc<IdentityRegistry>,
    index: Arc<DriverLocationIndex>,
    geocoder: Arc<dyn Geocoder>,
    transport: Arc<dyn Transport>,
    radius_km: f64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        index: Arc<DriverLocationIndex>,
        geocoder: Arc<dyn Geocoder>,
        transport: Arc<dyn Transport>,
        radius_km: f64,
    ) -> Self {
        Self {
            registry,
            index,
            geocoder,
            transport,
            radius_km,
        }
    }

    /// Fan a `new-ride` event out to candidate drivers. Never fails; every
    /// degradation (unresolvable pickup, empty radius, dead connections)
    /// still ends in the redundancy broadcast.
    pub fn dispatch(&self, ride: &Ride) -> DispatchReport {
        let event = OutboundEvent::new_ride(ride);
        let mut report = DispatchReport::default();

        let candidates = match self.geocoder.resolve(&ride.pickup) {
            Ok(pickup) => {
                match self
                    .index
                    .find_within_radius(pickup.lat, pickup.lng, self.radius_km)
                {
                    Ok(drivers) => drivers,
                    Err(err) => {
                        tracing::warn!(ride = %ride.id, %err, "radius query failed");
                        Vec::new()
                    }
                }
            }
            Err(err) => {
                tracing::warn!(ride = %ride.id, %err, "pickup geocoding failed");
                Vec::new()
            }
        };
        report.candidates = candidates.len();

        for driver in &candidates {
            match self.registry.lookup(driver, Role::Driver) {
                Some(connection) => {
                    if self.transport.send_to(&connection, &event) {
                        report.direct_sends += 1;
                    } else {
                        tracing::debug!(
                            ride = %ride.id,
                            driver = %driver,
                            "direct send unconfirmed"
                        );
                    }
                }
                None => {
                    tracing::debug!(ride = %ride.id, driver = %driver, "candidate not bound");
                }
            }
        }

        report.broadcast_delivered = self.transport.broadcast(DRIVER_CHANNEL, &event);

        tracing::info!(
            ride = %ride.id,
            candidates = report.candidates,
            direct_sends = report.direct_sends,
            broadcast = report.broadcast_delivered,
            "dispatched ride"
        );
        report
    }
}

/// Fire-and-forget handoff: ride creation enqueues, a worker thread runs the
/// fan-out. `shutdown` closes the queue and joins the worker after it drains,
/// which is how tests await dispatch completion deterministically.
pub struct DispatchQueue {
    tx: Option<mpsc::Sender<Ride>>,
    worker: Option<JoinHandle<()>>,
}

impl DispatchQueue {
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> Self {
        let (tx, rx) = mpsc::channel::<Ride>();
        let worker = thread::Builder::new()
            .name("dispatch-worker".to_string())
            .spawn(move || {
                while let Ok(ride) = rx.recv() {
                    dispatcher.dispatch(&ride);
                }
            })
            .expect("failed to spawn dispatch worker");
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Queue a ride for fan-out. Returns immediately; a queue that is
    /// already shut down drops the ride (logged), it never errors.
    pub fn enqueue(&self, ride: Ride) {
        match &self.tx {
            Some(tx) => {
                if tx.send(ride).is_err() {
                    tracing::warn!("dispatch queue worker is gone; ride not dispatched");
                }
            }
            None => tracing::warn!("dispatch queue already shut down; ride not dispatched"),
        }
    }

    /// Close the queue and wait for the worker to drain everything enqueued
    /// so far.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("dispatch worker panicked");
            }
        }
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
