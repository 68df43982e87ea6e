//! Per-connection session: read loop, identity, and core calls.
//!
//! A session starts anonymous. `join` binds the trusted
//! `(participantId, role)` identity to this connection; drivers are also
//! subscribed to the driver broadcast channel. Everything after that is a
//! switch over the two roles. Disconnect unbinds reactively.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use dispatch_core::error::DispatchError;
use dispatch_core::events::DRIVER_CHANNEL;
use dispatch_core::ids::{ConnectionId, ParticipantId, RideId, Role};
use dispatch_core::ride::VehicleType;

use crate::protocol::{ClientFrame, ServerFrame};
use crate::server::Gateway;
use crate::transport::next_connection_id;

pub async fn handle_connection(stream: TcpStream, gateway: Arc<Gateway>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection = next_connection_id();
    gateway.transport.register(connection.clone(), tx);

    let mut session = Session {
        gateway: gateway.clone(),
        connection: connection.clone(),
        identity: None,
    };

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let reply = session.handle_line(line);
                        if !gateway.transport.send_frame(&connection, &reply) {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::debug!(connection = %connection, %err, "read failed");
                        break;
                    }
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if write_half.write_all(frame.as_bytes()).await.is_err() {
                            break;
                        }
                        if write_half.write_all(b"\n").await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    gateway.transport.deregister(&connection);
    gateway.registry.unbind(&connection);
    tracing::info!(connection = %connection, "session closed");
}

struct Session {
    gateway: Arc<Gateway>,
    connection: ConnectionId,
    identity: Option<(ParticipantId, Role)>,
}

impl Session {
    fn handle_line(&mut self, line: &str) -> ServerFrame {
        let frame = match ClientFrame::parse(line) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(connection = %self.connection, %err, "bad frame");
                return ServerFrame::error("malformed frame");
            }
        };
        match frame {
            ClientFrame::Join {
                participant_id,
                role,
            } => self.join(participant_id, role),
            ClientFrame::UpdateLocation {
                driver_id,
                lat,
                lng,
            } => self.update_location(driver_id, lat, lng),
            ClientFrame::CreateRide {
                pickup,
                destination,
                vehicle_type,
            } => self.create_ride(&pickup, &destination, vehicle_type),
            ClientFrame::GetFare {
                pickup,
                destination,
            } => self.get_fare(&pickup, &destination),
            ClientFrame::AcceptRide { ride_id } => self.accept_ride(&ride_id),
            ClientFrame::StartRide { ride_id, otp } => self.start_ride(&ride_id, &otp),
            ClientFrame::CompleteRide { ride_id } => self.complete_ride(&ride_id),
        }
    }

    fn join(&mut self, participant_id: ParticipantId, role: Role) -> ServerFrame {
        self.gateway
            .registry
            .bind(participant_id.clone(), role, self.connection.clone());
        if role == Role::Driver {
            self.gateway
                .transport
                .subscribe(DRIVER_CHANNEL, self.connection.clone());
        }
        self.identity = Some((participant_id.clone(), role));
        tracing::info!(participant = %participant_id, %role, connection = %self.connection, "joined");
        ServerFrame::new(
            "joined",
            serde_json::json!({
                "participantId": participant_id,
                "role": role,
                "connectionId": self.connection,
            }),
        )
    }

    fn require_role(&self, role: Role) -> Result<&ParticipantId, ServerFrame> {
        match &self.identity {
            Some((participant, bound)) if *bound == role => Ok(participant),
            Some(_) => Err(ServerFrame::error(format!("must be joined as {role}"))),
            None => Err(ServerFrame::error("join first")),
        }
    }

    fn update_location(&self, driver_id: ParticipantId, lat: Value, lng: Value) -> ServerFrame {
        let driver = match self.require_role(Role::Driver) {
            Ok(driver) => driver,
            Err(frame) => return frame,
        };
        if *driver != driver_id {
            return ServerFrame::error("driverId does not match session identity");
        }
        let (Some(lat), Some(lng)) = (lat.as_f64(), lng.as_f64()) else {
            return error_frame(&DispatchError::InvalidLocation);
        };
        match self.gateway.index.report_location(&driver_id, lat, lng) {
            Ok(()) => ServerFrame::new("location-updated", serde_json::json!({ "success": true })),
            Err(err) => error_frame(&err),
        }
    }

    fn create_ride(
        &self,
        pickup: &str,
        destination: &str,
        vehicle_type: VehicleType,
    ) -> ServerFrame {
        let rider = match self.require_role(Role::Rider) {
            Ok(rider) => rider.clone(),
            Err(frame) => return frame,
        };
        match self
            .gateway
            .service
            .create_ride(rider, pickup, destination, vehicle_type)
        {
            Ok(ride) => {
                let reply = ServerFrame::new(
                    "ride-created",
                    serde_json::to_value(&ride).expect("ride serializes to JSON"),
                );
                // Fan-out happens after the reply is already on its way.
                self.gateway.enqueue_dispatch(ride);
                reply
            }
            Err(err) => error_frame(&err),
        }
    }

    fn get_fare(&self, pickup: &str, destination: &str) -> ServerFrame {
        if self.identity.is_none() {
            return ServerFrame::error("join first");
        }
        match self.gateway.service.fare_quote(pickup, destination) {
            Ok(quote) => ServerFrame::new(
                "fare",
                serde_json::to_value(quote).expect("quote serializes to JSON"),
            ),
            Err(err) => error_frame(&err),
        }
    }

    fn accept_ride(&self, ride_id: &RideId) -> ServerFrame {
        let driver = match self.require_role(Role::Driver) {
            Ok(driver) => driver.clone(),
            Err(frame) => return frame,
        };
        match self.gateway.service.accept(ride_id, driver) {
            Ok(ride) => {
                // Best-effort push to the rider; unconfirmed is fine.
                self.gateway.notifier.ride_accepted(&ride);
                ServerFrame::new(
                    "ride-accepted",
                    serde_json::to_value(&ride).expect("ride serializes to JSON"),
                )
            }
            Err(err) => error_frame(&err),
        }
    }

    fn start_ride(&self, ride_id: &RideId, otp: &str) -> ServerFrame {
        let driver = match self.require_role(Role::Driver) {
            Ok(driver) => driver.clone(),
            Err(frame) => return frame,
        };
        match self.gateway.service.start(ride_id, &driver, otp) {
            Ok(ride) => {
                self.gateway.notifier.ride_started(&ride);
                ServerFrame::new(
                    "ride-started",
                    serde_json::to_value(&ride).expect("ride serializes to JSON"),
                )
            }
            Err(err) => error_frame(&err),
        }
    }

    fn complete_ride(&self, ride_id: &RideId) -> ServerFrame {
        let driver = match self.require_role(Role::Driver) {
            Ok(driver) => driver.clone(),
            Err(frame) => return frame,
        };
        match self.gateway.service.complete(ride_id, &driver) {
            Ok(ride) => {
                self.gateway.notifier.ride_completed(&ride);
                ServerFrame::new(
                    "ride-completed",
                    serde_json::to_value(&ride).expect("ride serializes to JSON"),
                )
            }
            Err(err) => error_frame(&err),
        }
    }
}

fn error_frame(err: &DispatchError) -> ServerFrame {
    let code = match err {
        DispatchError::NotFound => "not-found",
        DispatchError::InvalidTransition => "invalid-transition",
        DispatchError::Forbidden => "forbidden",
        DispatchError::OtpMismatch => "otp-mismatch",
        DispatchError::InvalidLocation => "invalid-location",
        DispatchError::Geocode(_) => "geocode-error",
    };
    ServerFrame::new(
        "error",
        serde_json::json!({ "code": code, "message": err.to_string() }),
    )
}
