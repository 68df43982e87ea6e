mod support;

use std::sync::Arc;

use dispatch_core::dispatch::DispatchQueue;
use dispatch_core::events::{DRIVER_CHANNEL, NEW_RIDE};
use dispatch_core::ids::{ConnectionId, Role};
use dispatch_core::ride::VehicleType;

use support::test_core;

/// Pickup at (12.90, 77.58); driver A roughly 1.3 km away,
/// driver B roughly 20 km away, dispatch radius 2 km. Only A gets a direct
/// send; the broadcast covers everyone subscribed to the driver channel.
#[test]
fn nearby_driver_gets_direct_send_far_driver_does_not() {
    let core = test_core();

    core.index
        .report_location(&"driver-a".into(), 12.91, 77.59)
        .expect("driver A fix");
    core.index
        .report_location(&"driver-b".into(), 13.05, 77.70)
        .expect("driver B fix");
    core.registry
        .bind("driver-a".into(), Role::Driver, ConnectionId::new("c-a"));
    core.registry
        .bind("driver-b".into(), Role::Driver, ConnectionId::new("c-b"));

    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Car)
        .expect("create");
    let report = core.dispatcher.dispatch(&ride);

    assert_eq!(report.candidates, 1);
    assert_eq!(report.direct_sends, 1);
    assert!(report.broadcast_delivered);

    let sends = core.transport.direct_sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, ConnectionId::new("c-a"));

    let broadcasts = core.transport.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].0, DRIVER_CHANNEL);
    assert_eq!(broadcasts[0].1.name, NEW_RIDE);
}

#[test]
fn otp_is_blank_on_both_delivery_paths() {
    let core = test_core();
    core.index
        .report_location(&"driver-a".into(), 12.905, 77.585)
        .expect("fix");
    core.registry
        .bind("driver-a".into(), Role::Driver, ConnectionId::new("c-a"));

    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Auto)
        .expect("create");
    assert!(!ride.otp.is_empty(), "the rider-facing record keeps the otp");

    core.dispatcher.dispatch(&ride);

    let sends = core.transport.direct_sends();
    let broadcasts = core.transport.broadcasts();
    assert_eq!(sends[0].1.data["otp"], "");
    assert_eq!(broadcasts[0].1.data["otp"], "");
    // Both paths carry the identical payload; receivers deduplicate by id.
    assert_eq!(sends[0].1.data, broadcasts[0].1.data);
    assert_eq!(sends[0].1.data["id"], ride.id.0.as_str());
}

#[test]
fn creation_returns_before_dispatch_runs() {
    let core = test_core();
    core.index
        .report_location(&"driver-a".into(), 12.91, 77.59)
        .expect("fix");
    core.registry
        .bind("driver-a".into(), Role::Driver, ConnectionId::new("c-a"));

    let mut queue = DispatchQueue::spawn(core.dispatcher.clone());

    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Car)
        .expect("create");
    // The creation result is in hand; fan-out happens after the handoff.
    queue.enqueue(ride.clone());
    queue.shutdown();

    let sends = core.transport.direct_sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].1.data["id"], ride.id.0.as_str());
    assert_eq!(core.transport.broadcasts().len(), 1);
}

#[test]
fn zero_candidates_still_broadcasts() {
    let core = test_core();
    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Moto)
        .expect("create");

    let report = core.dispatcher.dispatch(&ride);
    assert_eq!(report.candidates, 0);
    assert!(report.broadcast_delivered);
    assert_eq!(core.transport.broadcasts().len(), 1);
}

#[test]
fn double_login_driver_receives_one_direct_send_on_latest_connection() {
    let core = test_core();
    core.index
        .report_location(&"driver-a".into(), 12.905, 77.585)
        .expect("fix");
    core.registry
        .bind("driver-a".into(), Role::Driver, ConnectionId::new("c-old"));
    core.registry
        .bind("driver-a".into(), Role::Driver, ConnectionId::new("c-new"));

    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Car)
        .expect("create");
    let report = core.dispatcher.dispatch(&ride);

    assert_eq!(report.direct_sends, 1);
    let sends = core.transport.direct_sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, ConnectionId::new("c-new"));
}

#[test]
fn broadcast_fails_only_when_transport_is_down() {
    let core = test_core();
    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Car)
        .expect("create");

    core.transport.shut_down();
    let report = core.dispatcher.dispatch(&ride);
    assert!(!report.broadcast_delivered);
    assert_eq!(report.direct_sends, 0);
}

#[test]
fn dispatch_failure_does_not_affect_the_persisted_ride() {
    let core = test_core();
    let ride = core
        .service
        .create_ride("rider-1".into(), "home", "office", VehicleType::Car)
        .expect("create");

    core.transport.shut_down();
    core.dispatcher.dispatch(&ride);

    let stored = core.service.find_ride(&ride.id).expect("ride persists");
    assert_eq!(stored, ride);
    assert_eq!(core.store.len(), 1);
}
