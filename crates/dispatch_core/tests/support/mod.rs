use std::sync::Arc;

use dispatch_core::dispatch::{Dispatcher, DEFAULT_DISPATCH_RADIUS_KM};
use dispatch_core::identity::IdentityRegistry;
use dispatch_core::lifecycle::RideService;
use dispatch_core::maps::{HaversineEstimator, DEFAULT_AVERAGE_SPEED_KMH};
use dispatch_core::spatial::DriverLocationIndex;
use dispatch_core::store::InMemoryRideStore;
use dispatch_core::test_support::{FixedGeocoder, RecordingTransport};

/// Everything a test needs to drive the core end to end, wired the way the
/// service wires it at startup.
pub struct TestCore {
    pub registry: Arc<IdentityRegistry>,
    pub index: Arc<DriverLocationIndex>,
    pub store: Arc<InMemoryRideStore>,
    pub transport: Arc<RecordingTransport>,
    pub service: RideService,
    pub dispatcher: Arc<Dispatcher>,
}

/// Builds a core around a fixed two-address city: `"home"` at
/// (12.90, 77.58) and `"office"` at (12.97, 77.59).
pub fn test_core() -> TestCore {
    let registry = Arc::new(IdentityRegistry::new());
    let index = Arc::new(DriverLocationIndex::new());
    let store = Arc::new(InMemoryRideStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let geocoder = Arc::new(
        FixedGeocoder::new()
            .with("home", 12.90, 77.58)
            .with("office", 12.97, 77.59),
    );

    let estimator = Arc::new(HaversineEstimator::new(
        geocoder.clone(),
        DEFAULT_AVERAGE_SPEED_KMH,
    ));
    let service = RideService::new(store.clone(), estimator);
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        index.clone(),
        geocoder,
        transport.clone(),
        DEFAULT_DISPATCH_RADIUS_KM,
    ));

    TestCore {
        registry,
        index,
        store,
        transport,
        service,
        dispatcher,
    }
}
