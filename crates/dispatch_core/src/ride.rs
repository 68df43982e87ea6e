//! Ride record and lifecycle states.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, RideId};

/// Lifecycle states, ordered. Transitions only move forward; `Completed` is
/// terminal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RideStatus {
    #[default]
    Requested,
    Accepted,
    InProgress,
    Completed,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Accepted => "accepted",
            RideStatus::InProgress => "in-progress",
            RideStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Auto,
    Car,
    Moto,
}

/// Digits in a generated OTP.
pub const OTP_LENGTH: u32 = 6;

/// Fixed-length numeric secret, uniform over all `OTP_LENGTH`-digit strings
/// (leading zeros included). Proves rider/driver proximity at trip start.
pub fn generate_otp<R: Rng>(rng: &mut R) -> String {
    let upper = 10u32.pow(OTP_LENGTH);
    format!(
        "{:0width$}",
        rng.gen_range(0..upper),
        width = OTP_LENGTH as usize
    )
}

/// Fresh 128-bit hex ride id.
pub fn fresh_ride_id<R: Rng>(rng: &mut R) -> RideId {
    let raw: u128 = rng.gen();
    RideId::new(format!("{raw:032x}"))
}

/// A persisted ride. Mutated only through the lifecycle operations; never
/// deleted, but excluded from notification once `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub rider: ParticipantId,
    /// Unset at `Requested`, set exactly once at `Accepted`, immutable after.
    pub driver: Option<ParticipantId>,
    pub pickup: String,
    pub destination: String,
    pub vehicle: VehicleType,
    pub fare: f64,
    /// Never sent to candidate drivers before acceptance.
    pub otp: String,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
}
