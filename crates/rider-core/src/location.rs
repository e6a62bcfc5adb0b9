//! Geographic coordinates.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build validated coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoreError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoreError::validation(format!(
                "latitude {} is out of range",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::validation(format!(
                "longitude {} is out of range",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// The (0, 0) origin, which recipients read as "location unavailable".
    pub const ORIGIN: Coordinates = Coordinates {
        latitude: 0.0,
        longitude: 0.0,
    };

    /// Whether this is the (0, 0) origin.
    pub fn is_origin(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    /// A maps search URL pointing at this position.
    pub fn maps_url(&self) -> String {
        format!(
            "https://www.google.com/maps/search/?api=1&query={},{}",
            self.latitude, self.longitude
        )
    }
}

/// A rider position that may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Location {
    Known(Coordinates),
    Unknown,
}

impl Location {
    /// Coordinates if known.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Location::Known(c) => Some(*c),
            Location::Unknown => None,
        }
    }

    /// Coordinates to put on the wire, with unknown encoded as the origin.
    pub fn wire_coordinates(&self) -> Coordinates {
        self.coordinates().unwrap_or(Coordinates::ORIGIN)
    }
}

impl From<Option<Coordinates>> for Location {
    fn from(value: Option<Coordinates>) -> Self {
        match value {
            Some(c) => Location::Known(c),
            None => Location::Unknown,
        }
    }
}
