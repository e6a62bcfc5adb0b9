//! Emergency contacts and the fall alert engine.
//!
//! - [`EmergencyContactManager`] keeps up to three designated friends per
//!   rider in the local store.
//! - [`FallDetector`] turns accelerometer samples into [`FallSignal`]s.
//! - [`FallAlertEngine`] composes an [`AlertRecord`] and fans it out through
//!   push dispatch, auditing every attempt.
//! - [`AlertPayload`] is the recipient-side reading of the pushed data.

pub mod alert;
pub mod contacts;
pub mod detector;
pub mod payload;

pub use alert::{
    AlertKind, AlertRecord, AlertRequest, AlertSummary, FallAlertEngine, TargetOutcome,
    ALERT_HISTORY_LIMIT, PLACEHOLDER_RIDER_NAME,
};
pub use contacts::{EmergencyContact, EmergencyContactManager, MAX_EMERGENCY_CONTACTS};
pub use detector::{AccelSample, DetectorConfig, FallDetector, FallSignal};
pub use payload::AlertPayload;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
