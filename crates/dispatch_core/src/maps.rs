//! Geocoding and routing collaborators.
//!
//! The core consumes these through the `Geocoder` and `RouteEstimator`
//! traits. The defaults are deterministic: addresses written as `"lat,lng"`
//! parse directly, and estimates are haversine distance at a configured
//! average speed. The `osrm` feature adds HTTP-backed implementations for a
//! Nominatim-style geocoder and an OSRM routing endpoint.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::DispatchError;
use crate::pricing::RouteEstimate;
use crate::spatial::{haversine_km, Coordinate};

pub trait Geocoder: Send + Sync {
    /// Resolve address text to a coordinate; `Geocode` on unresolvable input.
    fn resolve(&self, address: &str) -> Result<Coordinate, DispatchError>;
}

pub trait RouteEstimator: Send + Sync {
    /// Distance/time estimate between two address texts. Must be
    /// deterministic for identical inputs.
    fn estimate(&self, origin: &str, destination: &str) -> Result<RouteEstimate, DispatchError>;
}

/// Parses addresses of the form `"lat,lng"` (degrees). Deterministic default
/// for deployments that pass coordinates through the address field.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoordinateTextGeocoder;

impl Geocoder for CoordinateTextGeocoder {
    fn resolve(&self, address: &str) -> Result<Coordinate, DispatchError> {
        let mut parts = address.splitn(2, ',');
        let lat = parts
            .next()
            .and_then(|p| p.trim().parse::<f64>().ok())
            .ok_or_else(|| DispatchError::Geocode(format!("unresolvable address: {address}")))?;
        let lng = parts
            .next()
            .and_then(|p| p.trim().parse::<f64>().ok())
            .ok_or_else(|| DispatchError::Geocode(format!("unresolvable address: {address}")))?;
        Coordinate::new(lat, lng)
            .map_err(|_| DispatchError::Geocode(format!("coordinates out of range: {address}")))
    }
}

/// LRU cache over a geocoder. Only successful resolutions are cached;
/// failures are retried on the next call.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Mutex<LruCache<String, Coordinate>>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    fn resolve(&self, address: &str) -> Result<Coordinate, DispatchError> {
        {
            let mut cache = match self.cache.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(hit) = cache.get(address) {
                return Ok(*hit);
            }
        }
        let resolved = self.inner.resolve(address)?;
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.put(address.to_string(), resolved);
        Ok(resolved)
    }
}

/// Default average speed used to turn a distance into a duration.
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 30.0;

/// Haversine-based estimator: geocodes both ends and assumes a constant
/// average speed.
pub struct HaversineEstimator {
    geocoder: Arc<dyn Geocoder>,
    average_speed_kmh: f64,
}

impl HaversineEstimator {
    pub fn new(geocoder: Arc<dyn Geocoder>, average_speed_kmh: f64) -> Self {
        Self {
            geocoder,
            average_speed_kmh,
        }
    }
}

impl RouteEstimator for HaversineEstimator {
    fn estimate(&self, origin: &str, destination: &str) -> Result<RouteEstimate, DispatchError> {
        let from = self.geocoder.resolve(origin)?;
        let to = self.geocoder.resolve(destination)?;
        let distance_km = haversine_km(from, to);
        let duration_min = distance_km / self.average_speed_kmh * 60.0;
        Ok(RouteEstimate {
            distance_km,
            duration_min,
        })
    }
}

#[cfg(feature = "osrm")]
pub mod http {
    //! HTTP-backed collaborators: Nominatim-style geocoding and OSRM routing.

    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::Url;
    use serde::Deserialize;

    use super::{Geocoder, RouteEstimator};
    use crate::error::DispatchError;
    use crate::pricing::RouteEstimate;
    use crate::spatial::Coordinate;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

    fn build_client() -> Client {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build maps HTTP client")
    }

    #[derive(Debug, Deserialize)]
    struct NominatimHit {
        lat: String,
        lon: String,
    }

    /// Thin client for a Nominatim-compatible `/search` endpoint.
    #[derive(Debug, Clone)]
    pub struct NominatimGeocoder {
        client: Client,
        endpoint: String,
    }

    impl NominatimGeocoder {
        /// Create a geocoder for the given endpoint (e.g. `http://localhost:8088`).
        pub fn new(endpoint: &str) -> Self {
            Self {
                client: build_client(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            }
        }
    }

    impl Geocoder for NominatimGeocoder {
        fn resolve(&self, address: &str) -> Result<Coordinate, DispatchError> {
            let mut url = Url::parse(&format!("{}/search", self.endpoint))
                .map_err(|err| DispatchError::Geocode(format!("bad geocoder URL: {err}")))?;
            url.query_pairs_mut()
                .append_pair("q", address)
                .append_pair("format", "json")
                .append_pair("limit", "1");

            let response = self
                .client
                .get(url)
                .send()
                .map_err(|err| DispatchError::Geocode(format!("geocoder request failed: {err}")))?;
            let hits: Vec<NominatimHit> = response
                .json()
                .map_err(|err| DispatchError::Geocode(format!("geocoder response invalid: {err}")))?;
            let hit = hits
                .into_iter()
                .next()
                .ok_or_else(|| DispatchError::Geocode(format!("unresolvable address: {address}")))?;

            let lat = hit
                .lat
                .parse::<f64>()
                .map_err(|_| DispatchError::Geocode("geocoder returned bad latitude".to_string()))?;
            let lng = hit
                .lon
                .parse::<f64>()
                .map_err(|_| DispatchError::Geocode("geocoder returned bad longitude".to_string()))?;
            Coordinate::new(lat, lng)
                .map_err(|_| DispatchError::Geocode("geocoder returned out-of-range point".to_string()))
        }
    }

    #[derive(Debug, Deserialize)]
    struct OsrmRoute {
        distance: f64,
        duration: f64,
    }

    #[derive(Debug, Deserialize)]
    struct OsrmRouteResponse {
        code: String,
        #[serde(default)]
        routes: Vec<OsrmRoute>,
    }

    /// Routing estimator backed by an OSRM `/route/v1/driving` endpoint,
    /// composed with a geocoder for the address ends.
    pub struct OsrmEstimator {
        client: Client,
        endpoint: String,
        geocoder: Arc<dyn Geocoder>,
    }

    impl OsrmEstimator {
        pub fn new(endpoint: &str, geocoder: Arc<dyn Geocoder>) -> Self {
            Self {
                client: build_client(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
                geocoder,
            }
        }

        fn route_between(
            &self,
            from: Coordinate,
            to: Coordinate,
        ) -> Result<RouteEstimate, DispatchError> {
            let coords = format!("{},{};{},{}", from.lng, from.lat, to.lng, to.lat);
            let mut url = Url::parse(&format!("{}/route/v1/driving/{}", self.endpoint, coords))
                .map_err(|err| DispatchError::Geocode(format!("bad routing URL: {err}")))?;
            url.query_pairs_mut().append_pair("overview", "false");

            let response = self
                .client
                .get(url)
                .send()
                .map_err(|err| DispatchError::Geocode(format!("routing request failed: {err}")))?;
            let parsed: OsrmRouteResponse = response
                .json()
                .map_err(|err| DispatchError::Geocode(format!("routing response invalid: {err}")))?;
            if parsed.code != "Ok" {
                return Err(DispatchError::Geocode(format!(
                    "routing rejected request: {}",
                    parsed.code
                )));
            }
            let route = parsed
                .routes
                .into_iter()
                .next()
                .ok_or_else(|| DispatchError::Geocode("routing returned no routes".to_string()))?;
            Ok(RouteEstimate {
                distance_km: route.distance / 1000.0,
                duration_min: route.duration / 60.0,
            })
        }
    }

    impl RouteEstimator for OsrmEstimator {
        fn estimate(
            &self,
            origin: &str,
            destination: &str,
        ) -> Result<RouteEstimate, DispatchError> {
            let from = self.geocoder.resolve(origin)?;
            let to = self.geocoder.resolve(destination)?;
            self.route_between(from, to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn coordinate_text_geocoder_parses_lat_lng() {
        let geocoder = CoordinateTextGeocoder;
        let point = geocoder.resolve("12.90, 77.58").expect("resolve");
        assert!((point.lat - 12.90).abs() < 1e-9);
        assert!((point.lng - 77.58).abs() < 1e-9);
    }

    #[test]
    fn coordinate_text_geocoder_rejects_garbage() {
        let geocoder = CoordinateTextGeocoder;
        assert!(matches!(
            geocoder.resolve("MG Road"),
            Err(DispatchError::Geocode(_))
        ));
        assert!(matches!(
            geocoder.resolve("95.0,77.0"),
            Err(DispatchError::Geocode(_))
        ));
    }

    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    impl Geocoder for CountingGeocoder {
        fn resolve(&self, address: &str) -> Result<Coordinate, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CoordinateTextGeocoder.resolve(address)
        }
    }

    #[test]
    fn cached_geocoder_caches_successes_only() {
        let counting = CountingGeocoder {
            calls: AtomicUsize::new(0),
        };
        let cached = CachedGeocoder::new(counting, NonZeroUsize::new(8).expect("capacity"));

        cached.resolve("12.90,77.58").expect("first");
        cached.resolve("12.90,77.58").expect("second");
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);

        assert!(cached.resolve("nowhere").is_err());
        assert!(cached.resolve("nowhere").is_err());
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn haversine_estimator_is_deterministic() {
        let estimator =
            HaversineEstimator::new(Arc::new(CoordinateTextGeocoder), DEFAULT_AVERAGE_SPEED_KMH);
        let a = estimator.estimate("12.90,77.58", "12.97,77.59").expect("estimate");
        let b = estimator.estimate("12.90,77.58", "12.97,77.59").expect("estimate");
        assert_eq!(a, b);
        assert!(a.distance_km > 7.0 && a.distance_km < 8.5);
        assert!((a.duration_min - a.distance_km * 2.0).abs() < 1e-9);
    }
}
