//! Fixed per-vehicle pricing table applied to a route estimate.
//!
//! Fares are a pure function of the estimate, so quotes are deterministic
//! whenever the routing collaborator is.

use serde::{Deserialize, Serialize};

use crate::ride::VehicleType;

/// Distance/time estimate produced by the routing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
}

struct Rate {
    base: f64,
    per_km: f64,
    per_min: f64,
}

const fn rate_for(vehicle: VehicleType) -> Rate {
    match vehicle {
        VehicleType::Auto => Rate {
            base: 30.0,
            per_km: 10.0,
            per_min: 2.0,
        },
        VehicleType::Car => Rate {
            base: 50.0,
            per_km: 15.0,
            per_min: 3.0,
        },
        VehicleType::Moto => Rate {
            base: 20.0,
            per_km: 8.0,
            per_min: 1.5,
        },
    }
}

/// Fare for one vehicle type, rounded to whole currency units.
pub fn fare_for(vehicle: VehicleType, estimate: &RouteEstimate) -> f64 {
    let rate = rate_for(vehicle);
    (rate.base + estimate.distance_km * rate.per_km + estimate.duration_min * rate.per_min).round()
}

/// Quote across all vehicle types for a single estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareQuote {
    pub auto: f64,
    pub car: f64,
    pub moto: f64,
}

pub fn quote(estimate: &RouteEstimate) -> FareQuote {
    FareQuote {
        auto: fare_for(VehicleType::Auto, estimate),
        car: fare_for(VehicleType::Car, estimate),
        moto: fare_for(VehicleType::Moto, estimate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fare_includes_base_distance_and_time() {
        let estimate = RouteEstimate {
            distance_km: 10.0,
            duration_min: 20.0,
        };
        assert_eq!(fare_for(VehicleType::Auto, &estimate), 170.0);
        assert_eq!(fare_for(VehicleType::Car, &estimate), 260.0);
        assert_eq!(fare_for(VehicleType::Moto, &estimate), 130.0);
    }

    #[test]
    fn quote_is_deterministic_for_identical_estimates() {
        let estimate = RouteEstimate {
            distance_km: 3.3,
            duration_min: 7.7,
        };
        assert_eq!(quote(&estimate), quote(&estimate));
    }

    #[test]
    fn zero_length_trip_costs_base_fare() {
        let estimate = RouteEstimate {
            distance_km: 0.0,
            duration_min: 0.0,
        };
        assert_eq!(fare_for(VehicleType::Car, &estimate), 50.0);
    }
}
