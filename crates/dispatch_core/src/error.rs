//! Error taxonomy for the dispatch core.
//!
//! State-machine errors are returned synchronously to the transition's
//! caller. Dispatch and notification failures are never surfaced here: an
//! unconfirmed delivery is a `false` return from the send operations, logged
//! and counted by the caller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The ride id is unknown to the store.
    #[error("ride not found")]
    NotFound,

    /// A lifecycle precondition was violated (wrong current status).
    #[error("invalid ride status transition")]
    InvalidTransition,

    /// The caller is not the driver assigned to this ride.
    #[error("caller is not authorized for this ride")]
    Forbidden,

    /// The supplied OTP does not match the one generated at creation.
    #[error("otp mismatch")]
    OtpMismatch,

    /// Malformed or out-of-range geolocation input.
    #[error("invalid location")]
    InvalidLocation,

    /// The geocoding or routing collaborator could not resolve the input.
    #[error("geocoding failed: {0}")]
    Geocode(String),
}
