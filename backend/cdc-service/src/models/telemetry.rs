use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Waste-truck position report. One message per position fix; deliveries are
/// at-least-once and unordered, so persistence is keyed on
/// `(event_id, truck_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruckMessage {
    pub event_id: String,
    pub truck_id: String,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub long: f64,
}

/// Bulk snapshot or incremental update of bike stations for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobilityStationsMessage {
    pub event_id: String,
    pub stations: Vec<MobilityStation>,
    pub metadata: StationsMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobilityStation {
    pub station_id: String,
    pub name: String,
    pub location: Value,
    pub capacity: i32,
    pub bikes_count: i32,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationsMetadata {
    pub mode: String,
    pub sent_at: String,
    pub total_stations: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_truck_wire_format() {
        let raw = r#"{"eventId":"ev-1","truckId":"t-7","position":{"lat":-34.6,"long":-58.4}}"#;
        let msg: TruckMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.event_id, "ev-1");
        assert_eq!(msg.truck_id, "t-7");
        assert!((msg.position.lat + 34.6).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_stations_wire_format() {
        let raw = r#"{
            "eventId": "ev-1",
            "stations": [{
                "stationId": "st-1",
                "name": "Plaza Central",
                "location": {"type": "Point", "coordinates": [-58.4, -34.6]},
                "capacity": 20,
                "bikesCount": 7,
                "status": "IN_SERVICE"
            }],
            "metadata": {"mode": "bulk", "sentAt": "2025-01-15T12:00:00Z", "totalStations": 1}
        }"#;
        let msg: MobilityStationsMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.stations.len(), 1);
        assert_eq!(msg.stations[0].station_id, "st-1");
        assert_eq!(msg.metadata.mode, "bulk");
    }
}
