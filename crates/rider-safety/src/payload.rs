//! The push data blob carried to alert recipients.
//!
//! The gateway treats `data` as opaque, so recipients parse it leniently:
//! any missing or malformed field reads as unavailable.

use chrono::{DateTime, Utc};
use rider_core::{Coordinates, Location};
use serde_json::{json, Value};

use crate::alert::{AlertKind, AlertRecord, PLACEHOLDER_RIDER_NAME};

/// Recipient-side view of an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPayload {
    pub alert_id: Option<String>,
    pub kind: Option<AlertKind>,
    pub location: Location,
    pub rider_id: Option<String>,
    pub rider_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl AlertPayload {
    /// Encode the data blob for `record`. Unknown locations go out as (0, 0).
    pub fn encode(record: &AlertRecord) -> Value {
        let coordinates = record.location.wire_coordinates();
        let mut data = json!({
            "type": "emergency_alert",
            "kind": record.kind.as_str(),
            "alertId": record.alert_id,
            "latitude": coordinates.latitude,
            "longitude": coordinates.longitude,
            "riderId": record.rider_user_id,
            "riderName": record.rider_display_name,
            "timestamp": record.timestamp.to_rfc3339(),
        });
        if let (Some(message), Some(map)) = (&record.message, data.as_object_mut()) {
            map.insert("message".to_string(), Value::String(message.clone()));
        }
        data
    }

    /// Parse a received data blob.
    pub fn from_data(data: &Value) -> Self {
        let text = |field: &str| {
            data.get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let kind = data
            .get("kind")
            .and_then(Value::as_str)
            .and_then(AlertKind::parse);

        let location = match (number(data, "latitude"), number(data, "longitude")) {
            (Some(lat), Some(lon)) => match Coordinates::new(lat, lon) {
                Ok(c) if !c.is_origin() => Location::Known(c),
                _ => Location::Unknown,
            },
            _ => Location::Unknown,
        };

        let timestamp = text("timestamp")
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc));

        Self {
            alert_id: text("alertId"),
            kind,
            location,
            rider_id: text("riderId"),
            rider_name: text("riderName"),
            timestamp,
            message: text("message"),
        }
    }

    /// Whether the sender's position is known.
    pub fn has_location(&self) -> bool {
        matches!(self.location, Location::Known(_))
    }

    /// Maps link for the sender's position.
    pub fn maps_url(&self) -> Option<String> {
        self.location.coordinates().map(|c| c.maps_url())
    }

    /// Name to show for the sender.
    pub fn display_name(&self) -> &str {
        self.rider_name.as_deref().unwrap_or(PLACEHOLDER_RIDER_NAME)
    }
}

// Accepts numbers and numeric strings.
fn number(data: &Value, field: &str) -> Option<f64> {
    match data.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
