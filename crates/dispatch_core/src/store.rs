//! Persistence collaborator for rides.
//!
//! The trait is the seam to the durable store. `update_status` carries the
//! compare-and-set semantics the lifecycle depends on: the read-check-write
//! of `status` is one serialized operation, so two drivers can never both win
//! an accept and a retried transition cannot apply twice.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ids::{ParticipantId, RideId};
use crate::ride::{Ride, RideStatus};

/// Fields applied atomically together with a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub new_status: RideStatus,
    /// Set exactly once, at the `Requested -> Accepted` transition.
    pub assign_driver: Option<ParticipantId>,
}

/// Conflict outcomes of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConflict {
    NotFound,
    /// The ride was no longer in the expected status.
    StatusChanged { actual: RideStatus },
}

pub trait RideStore: Send + Sync {
    fn save(&self, ride: Ride);

    fn find_by_id(&self, id: &RideId) -> Option<Ride>;

    /// Compare-and-set: applies `update` only while the ride is still in
    /// `expected` status, returning the updated ride.
    fn update_status(
        &self,
        id: &RideId,
        expected: RideStatus,
        update: StatusUpdate,
    ) -> Result<Ride, StoreConflict>;
}

/// Reference store keeping rides in memory. One mutex serializes the CAS;
/// durable stores implement the same contract with a conditional update.
#[derive(Debug, Default)]
pub struct InMemoryRideStore {
    rides: Mutex<HashMap<RideId, Ride>>,
}

impl InMemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let rides = match self.rides.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RideStore for InMemoryRideStore {
    fn save(&self, ride: Ride) {
        let mut rides = match self.rides.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rides.insert(ride.id.clone(), ride);
    }

    fn find_by_id(&self, id: &RideId) -> Option<Ride> {
        let rides = match self.rides.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rides.get(id).cloned()
    }

    fn update_status(
        &self,
        id: &RideId,
        expected: RideStatus,
        update: StatusUpdate,
    ) -> Result<Ride, StoreConflict> {
        let mut rides = match self.rides.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let ride = rides.get_mut(id).ok_or(StoreConflict::NotFound)?;
        if ride.status != expected {
            return Err(StoreConflict::StatusChanged {
                actual: ride.status,
            });
        }
        ride.status = update.new_status;
        if let Some(driver) = update.assign_driver {
            ride.driver = Some(driver);
        }
        Ok(ride.clone())
    }
}
