//! Boundary events produced by the core.
//!
//! A `new-ride` event travels two paths with an identical payload: direct
//! sends to candidate drivers and the driver-wide broadcast channel.
//! Receivers consuming both must deduplicate by ride id. The OTP is blanked
//! on every pre-acceptance payload; rider-directed transition events carry
//! the full ride because the rider owns the OTP.

use serde_json::Value;

use crate::ride::Ride;

pub const NEW_RIDE: &str = "new-ride";
pub const RIDE_ACCEPTED: &str = "ride-accepted";
pub const RIDE_STARTED: &str = "ride-started";
pub const RIDE_COMPLETED: &str = "ride-completed";

/// Broadcast channel every driver subscribes to on join.
pub const DRIVER_CHANNEL: &str = "drivers";

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub name: &'static str,
    pub data: Value,
}

fn ride_payload(ride: &Ride) -> Value {
    serde_json::to_value(ride).expect("ride serializes to JSON")
}

impl OutboundEvent {
    /// Candidate-driver fan-out payload; the OTP never leaks pre-acceptance.
    pub fn new_ride(ride: &Ride) -> Self {
        let mut data = ride_payload(ride);
        data["otp"] = Value::String(String::new());
        Self {
            name: NEW_RIDE,
            data,
        }
    }

    pub fn ride_accepted(ride: &Ride) -> Self {
        Self {
            name: RIDE_ACCEPTED,
            data: ride_payload(ride),
        }
    }

    pub fn ride_started(ride: &Ride) -> Self {
        Self {
            name: RIDE_STARTED,
            data: ride_payload(ride),
        }
    }

    pub fn ride_completed(ride: &Ride) -> Self {
        Self {
            name: RIDE_COMPLETED,
            data: ride_payload(ride),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RideId;
    use crate::ride::{RideStatus, VehicleType};
    use chrono::Utc;

    fn ride() -> Ride {
        Ride {
            id: RideId::new("ride-1"),
            rider: "r1".into(),
            driver: None,
            pickup: "12.90,77.58".to_string(),
            destination: "12.97,77.59".to_string(),
            vehicle: VehicleType::Auto,
            fare: 95.0,
            otp: "004821".to_string(),
            status: RideStatus::Requested,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn new_ride_blanks_the_otp() {
        let event = OutboundEvent::new_ride(&ride());
        assert_eq!(event.name, NEW_RIDE);
        assert_eq!(event.data["otp"], "");
        assert_eq!(event.data["id"], "ride-1");
        assert_eq!(event.data["status"], "requested");
    }

    #[test]
    fn rider_events_keep_the_otp() {
        let event = OutboundEvent::ride_accepted(&ride());
        assert_eq!(event.name, RIDE_ACCEPTED);
        assert_eq!(event.data["otp"], "004821");
    }
}
