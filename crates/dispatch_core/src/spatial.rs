//! Spatial operations: H3-bucketed driver locations and haversine distances.
//!
//! This module provides:
//!
//! - **Coordinate**: validated latitude/longitude pair
//! - **Haversine distance**: great-circle distance over raw coordinates
//! - **DriverLocationIndex**: latest driver fixes, bucketed by H3 cell for
//!   radius queries that scan a grid disk instead of every driver
//!
//! Resolution 9 (~240m cell size) buckets the fixes; radius membership is
//! always decided by the exact haversine distance of the raw reported
//! coordinates, never by cell geometry alone.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::ids::ParticipantId;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// H3 resolution used to bucket driver fixes.
const INDEX_RESOLUTION: Resolution = Resolution::Nine;

/// Conservative ring spacing at resolution 9, used to size grid disks so a
/// disk always covers the query radius. Overcounting is harmless because the
/// haversine filter decides membership.
const RING_SPACING_KM: f64 = 0.25;

/// Validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Rejects non-finite or out-of-range values with `InvalidLocation`.
    pub fn new(lat: f64, lng: f64) -> Result<Self, DispatchError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(DispatchError::InvalidLocation);
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(DispatchError::InvalidLocation);
        }
        Ok(Self { lat, lng })
    }

    fn cell(&self) -> Result<CellIndex, DispatchError> {
        let latlng = LatLng::new(self.lat, self.lng).map_err(|_| DispatchError::InvalidLocation)?;
        Ok(latlng.to_cell(INDEX_RESOLUTION))
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Number of H3 rings needed so a grid disk covers `radius_km`.
fn disk_rings_for_radius(radius_km: f64) -> u32 {
    ((radius_km / RING_SPACING_KM).ceil() as u32).saturating_add(1)
}

/// Latest known fix for a driver. No history is kept.
#[derive(Debug, Clone)]
pub struct DriverFix {
    pub coordinate: Coordinate,
    pub updated_at: DateTime<Utc>,
    cell: CellIndex,
}

#[derive(Debug, Default)]
struct IndexInner {
    fixes: HashMap<ParticipantId, DriverFix>,
    drivers_by_cell: HashMap<CellIndex, Vec<ParticipantId>>,
}

impl IndexInner {
    fn remove_from_cell(&mut self, driver: &ParticipantId, cell: CellIndex) {
        if let Some(drivers) = self.drivers_by_cell.get_mut(&cell) {
            drivers.retain(|d| d != driver);
            if drivers.is_empty() {
                self.drivers_by_cell.remove(&cell);
            }
        }
    }
}

/// Shared index of the latest driver fixes. Process-lifetime only; drivers
/// re-report after a restart.
#[derive(Debug, Default)]
pub struct DriverLocationIndex {
    inner: RwLock<IndexInner>,
}

impl DriverLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the driver's latest fix, re-bucketing it when the cell changed.
    pub fn report_location(
        &self,
        driver: &ParticipantId,
        lat: f64,
        lng: f64,
    ) -> Result<(), DispatchError> {
        let coordinate = Coordinate::new(lat, lng)?;
        let cell = coordinate.cell()?;

        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous_cell = inner.fixes.get(driver).map(|fix| fix.cell);
        match previous_cell {
            Some(old_cell) if old_cell == cell => {}
            Some(old_cell) => {
                inner.remove_from_cell(driver, old_cell);
                inner
                    .drivers_by_cell
                    .entry(cell)
                    .or_default()
                    .push(driver.clone());
            }
            None => {
                inner
                    .drivers_by_cell
                    .entry(cell)
                    .or_default()
                    .push(driver.clone());
            }
        }
        inner.fixes.insert(
            driver.clone(),
            DriverFix {
                coordinate,
                updated_at: Utc::now(),
                cell,
            },
        );
        Ok(())
    }

    /// Drop a driver's fix entirely (e.g. the driver went off duty).
    pub fn remove(&self, driver: &ParticipantId) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(fix) = inner.fixes.remove(driver) {
            inner.remove_from_cell(driver, fix.cell);
        }
    }

    /// Drivers whose last reported fix lies within `radius_km` great-circle
    /// distance of the query point. Drivers with no fix are never returned.
    /// Order is deterministic: ascending distance, ties by ascending id.
    pub fn find_within_radius(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<ParticipantId>, DispatchError> {
        let origin = Coordinate::new(lat, lng)?;
        let origin_cell = origin.cell()?;
        let disk = origin_cell.grid_disk::<Vec<_>>(disk_rings_for_radius(radius_km));

        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut matches: Vec<(f64, ParticipantId)> = Vec::new();
        for cell in disk {
            let Some(drivers) = inner.drivers_by_cell.get(&cell) else {
                continue;
            };
            for driver in drivers {
                let Some(fix) = inner.fixes.get(driver) else {
                    continue;
                };
                let distance = haversine_km(origin, fix.coordinate);
                if distance <= radius_km {
                    matches.push((distance, driver.clone()));
                }
            }
        }
        matches.sort_by(|(da, ia), (db, ib)| {
            da.partial_cmp(db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ia.cmp(ib))
        });
        Ok(matches.into_iter().map(|(_, driver)| driver).collect())
    }

    /// Latest fix for a driver, if one was reported.
    pub fn last_fix(&self, driver: &ParticipantId) -> Option<DriverFix> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.fixes.get(driver).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
