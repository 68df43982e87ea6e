//! Wire frames: one JSON object per line.
//!
//! Inbound frames are `{"event": ..., "data": {...}}` with the event names
//! below; outbound frames reuse the same envelope so clients multiplex
//! replies and pushes on one stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dispatch_core::ids::{ParticipantId, RideId, Role};
use dispatch_core::ride::VehicleType;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Join {
        participant_id: ParticipantId,
        role: Role,
    },
    /// Coordinates decode as raw JSON so a missing or non-numeric value is a
    /// location validation error, not a frame parse error.
    #[serde(rename_all = "camelCase")]
    UpdateLocation {
        driver_id: ParticipantId,
        #[serde(default)]
        lat: Value,
        #[serde(default)]
        lng: Value,
    },
    #[serde(rename_all = "camelCase")]
    CreateRide {
        pickup: String,
        destination: String,
        vehicle_type: VehicleType,
    },
    GetFare {
        pickup: String,
        destination: String,
    },
    #[serde(rename_all = "camelCase")]
    AcceptRide { ride_id: RideId },
    #[serde(rename_all = "camelCase")]
    StartRide { ride_id: RideId, otp: String },
    #[serde(rename_all = "camelCase")]
    CompleteRide { ride_id: RideId },
}

impl ClientFrame {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("frame serializes to JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_frame() {
        let frame = ClientFrame::parse(
            r#"{"event":"join","data":{"participantId":"d1","role":"driver"}}"#,
        )
        .expect("frame");
        assert_eq!(
            frame,
            ClientFrame::Join {
                participant_id: ParticipantId::new("d1"),
                role: Role::Driver,
            }
        );
    }

    #[test]
    fn parses_update_location_frame() {
        let frame = ClientFrame::parse(
            r#"{"event":"update-location","data":{"driverId":"d1","lat":12.9,"lng":77.58}}"#,
        )
        .expect("frame");
        assert_eq!(
            frame,
            ClientFrame::UpdateLocation {
                driver_id: ParticipantId::new("d1"),
                lat: serde_json::json!(12.9),
                lng: serde_json::json!(77.58),
            }
        );
    }

    #[test]
    fn update_location_with_bad_coordinates_still_parses() {
        let frame = ClientFrame::parse(
            r#"{"event":"update-location","data":{"driverId":"d1","lng":"east"}}"#,
        )
        .expect("frame");
        assert_eq!(
            frame,
            ClientFrame::UpdateLocation {
                driver_id: ParticipantId::new("d1"),
                lat: Value::Null,
                lng: serde_json::json!("east"),
            }
        );
    }

    #[test]
    fn parses_ride_frames() {
        let frame = ClientFrame::parse(
            r#"{"event":"create-ride","data":{"pickup":"12.90,77.58","destination":"12.97,77.59","vehicleType":"car"}}"#,
        )
        .expect("frame");
        assert!(matches!(frame, ClientFrame::CreateRide { .. }));

        let frame = ClientFrame::parse(
            r#"{"event":"start-ride","data":{"rideId":"abc","otp":"004821"}}"#,
        )
        .expect("frame");
        assert_eq!(
            frame,
            ClientFrame::StartRide {
                ride_id: RideId::new("abc"),
                otp: "004821".to_string(),
            }
        );
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(ClientFrame::parse(r#"{"event":"dance","data":{}}"#).is_err());
    }

    #[test]
    fn server_frame_round_trips() {
        let frame = ServerFrame::new("joined", serde_json::json!({ "ok": true }));
        let line = frame.to_line();
        let parsed: ServerFrame = serde_json::from_str(&line).expect("frame");
        assert_eq!(parsed, frame);
    }
}
