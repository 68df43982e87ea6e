//! Ride state machine: requested -> accepted -> in-progress -> completed.
//!
//! Every transition is a single compare-and-set against the store, so the
//! read-check-write of `status` can never interleave: of two concurrent
//! accepts exactly one wins and the loser observes `InvalidTransition`.
//!
//! Check order for driver transitions is fixed: NotFound, Forbidden,
//! InvalidTransition, then OtpMismatch. The taxonomy deliberately reveals no
//! more than that; the OTP comparison does not short-circuit.

use std::sync::Arc;

use rand::thread_rng;

use crate::error::DispatchError;
use crate::ids::{ParticipantId, RideId};
use crate::maps::RouteEstimator;
use crate::pricing::{self, FareQuote};
use crate::ride::{fresh_ride_id, generate_otp, Ride, RideStatus, VehicleType};
use crate::store::{RideStore, StatusUpdate, StoreConflict};

pub struct RideService {
    store: Arc<dyn RideStore>,
    estimator: Arc<dyn RouteEstimator>,
}

fn otp_matches(expected: &str, supplied: &str) -> bool {
    if expected.len() != supplied.len() {
        return false;
    }
    // Fold over every byte; no early exit on the first mismatch.
    expected
        .bytes()
        .zip(supplied.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

impl RideService {
    pub fn new(store: Arc<dyn RideStore>, estimator: Arc<dyn RouteEstimator>) -> Self {
        Self { store, estimator }
    }

    /// Create a ride in `Requested` status with a fresh id, OTP and fare.
    /// Persisting the ride is all this does; candidate fan-out is the
    /// dispatcher's job and never blocks or fails creation.
    pub fn create_ride(
        &self,
        rider: ParticipantId,
        pickup: &str,
        destination: &str,
        vehicle: VehicleType,
    ) -> Result<Ride, DispatchError> {
        let estimate = self.estimator.estimate(pickup, destination)?;
        let fare = pricing::fare_for(vehicle, &estimate);

        let mut rng = thread_rng();
        let ride = Ride {
            id: fresh_ride_id(&mut rng),
            rider,
            driver: None,
            pickup: pickup.to_string(),
            destination: destination.to_string(),
            vehicle,
            fare,
            otp: generate_otp(&mut rng),
            status: RideStatus::Requested,
            created_at: chrono::Utc::now(),
        };
        self.store.save(ride.clone());
        tracing::info!(ride = %ride.id, rider = %ride.rider, "ride created");
        Ok(ride)
    }

    /// Assign the ride to `driver`. Exactly one of any set of concurrent
    /// accepts succeeds; the rest observe `InvalidTransition`.
    pub fn accept(&self, ride_id: &RideId, driver: ParticipantId) -> Result<Ride, DispatchError> {
        let update = StatusUpdate {
            new_status: RideStatus::Accepted,
            assign_driver: Some(driver.clone()),
        };
        match self.store.update_status(ride_id, RideStatus::Requested, update) {
            Ok(ride) => {
                tracing::info!(ride = %ride.id, driver = %driver, "ride accepted");
                Ok(ride)
            }
            Err(StoreConflict::NotFound) => Err(DispatchError::NotFound),
            Err(StoreConflict::StatusChanged { .. }) => Err(DispatchError::InvalidTransition),
        }
    }

    /// Start the trip. Requires the assigned driver and the OTP generated at
    /// creation.
    pub fn start(
        &self,
        ride_id: &RideId,
        driver: &ParticipantId,
        supplied_otp: &str,
    ) -> Result<Ride, DispatchError> {
        let ride = self.store.find_by_id(ride_id).ok_or(DispatchError::NotFound)?;
        if ride.driver.as_ref() != Some(driver) {
            return Err(DispatchError::Forbidden);
        }
        if ride.status != RideStatus::Accepted {
            return Err(DispatchError::InvalidTransition);
        }
        if !otp_matches(&ride.otp, supplied_otp) {
            return Err(DispatchError::OtpMismatch);
        }

        let update = StatusUpdate {
            new_status: RideStatus::InProgress,
            assign_driver: None,
        };
        match self.store.update_status(ride_id, RideStatus::Accepted, update) {
            Ok(ride) => {
                tracing::info!(ride = %ride.id, driver = %driver, "ride started");
                Ok(ride)
            }
            Err(StoreConflict::NotFound) => Err(DispatchError::NotFound),
            Err(StoreConflict::StatusChanged { .. }) => Err(DispatchError::InvalidTransition),
        }
    }

    /// Complete the trip. Terminal; the ride is retained but no further
    /// notification concerns it.
    pub fn complete(
        &self,
        ride_id: &RideId,
        driver: &ParticipantId,
    ) -> Result<Ride, DispatchError> {
        let ride = self.store.find_by_id(ride_id).ok_or(DispatchError::NotFound)?;
        if ride.driver.as_ref() != Some(driver) {
            return Err(DispatchError::Forbidden);
        }
        if ride.status != RideStatus::InProgress {
            return Err(DispatchError::InvalidTransition);
        }

        let update = StatusUpdate {
            new_status: RideStatus::Completed,
            assign_driver: None,
        };
        match self.store.update_status(ride_id, RideStatus::InProgress, update) {
            Ok(ride) => {
                tracing::info!(ride = %ride.id, driver = %driver, "ride completed");
                Ok(ride)
            }
            Err(StoreConflict::NotFound) => Err(DispatchError::NotFound),
            Err(StoreConflict::StatusChanged { .. }) => Err(DispatchError::InvalidTransition),
        }
    }

    /// Per-vehicle fare quote between two addresses. Deterministic for
    /// identical inputs as long as the estimator is.
    pub fn fare_quote(&self, pickup: &str, destination: &str) -> Result<FareQuote, DispatchError> {
        let estimate = self.estimator.estimate(pickup, destination)?;
        Ok(pricing::quote(&estimate))
    }

    pub fn find_ride(&self, ride_id: &RideId) -> Option<Ride> {
        self.store.find_by_id(ride_id)
    }
}
