//! Gateway wiring: one shared core assembled at service start.

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;

use dispatch_core::delivery::Notifier;
use dispatch_core::dispatch::{DispatchQueue, Dispatcher, DEFAULT_DISPATCH_RADIUS_KM};
use dispatch_core::identity::IdentityRegistry;
use dispatch_core::lifecycle::RideService;
use dispatch_core::maps::{
    CachedGeocoder, CoordinateTextGeocoder, Geocoder, HaversineEstimator,
    DEFAULT_AVERAGE_SPEED_KMH,
};
use dispatch_core::ride::Ride;
use dispatch_core::spatial::DriverLocationIndex;
use dispatch_core::store::InMemoryRideStore;

use crate::session;
use crate::transport::ChannelTransport;

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    pub dispatch_radius_km: f64,
    pub average_speed_kmh: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dispatch_radius_km: DEFAULT_DISPATCH_RADIUS_KM,
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
        }
    }
}

const GEOCODE_CACHE_CAPACITY: usize = 1024;

/// Shared state behind every session. Built once at startup, torn down with
/// `shutdown` (drains the dispatch queue, clears registry and transport).
pub struct Gateway {
    pub registry: Arc<IdentityRegistry>,
    pub index: Arc<DriverLocationIndex>,
    pub service: RideService,
    pub notifier: Notifier,
    pub transport: Arc<ChannelTransport>,
    queue: Mutex<DispatchQueue>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let registry = Arc::new(IdentityRegistry::new());
        let index = Arc::new(DriverLocationIndex::new());
        let transport = Arc::new(ChannelTransport::new());
        let store = Arc::new(InMemoryRideStore::new());

        let capacity = NonZeroUsize::new(GEOCODE_CACHE_CAPACITY).expect("cache capacity");
        let geocoder: Arc<dyn Geocoder> =
            Arc::new(CachedGeocoder::new(CoordinateTextGeocoder, capacity));
        let estimator = Arc::new(HaversineEstimator::new(
            geocoder.clone(),
            config.average_speed_kmh,
        ));

        let service = RideService::new(store, estimator);
        let notifier = Notifier::new(registry.clone(), transport.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            index.clone(),
            geocoder,
            transport.clone(),
            config.dispatch_radius_km,
        ));
        let queue = Mutex::new(DispatchQueue::spawn(dispatcher));

        Arc::new(Self {
            registry,
            index,
            service,
            notifier,
            transport,
            queue,
        })
    }

    /// Hand a freshly created ride to the dispatch worker; returns
    /// immediately.
    pub fn enqueue_dispatch(&self, ride: Ride) {
        self.queue.lock().enqueue(ride);
    }

    /// Drain the dispatch queue and drop all live state.
    pub fn shutdown(&self) {
        self.queue.lock().shutdown();
        self.registry.clear();
        self.transport.shut_down();
    }

    /// Accept loop; one session task per connection.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::info!(%peer, "accepted connection");
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        session::handle_connection(stream, gateway).await;
                    });
                }
                Err(err) => {
                    tracing::error!(%err, "accept failed");
                }
            }
        }
    }
}
