//! Push dispatch for emergency alerts.
//!
//! This crate provides:
//!
//! - [`PushDispatch`]: device registration, single-attempt classified sends
//!   and the per-alert delivery audit log
//! - [`PushGateway`]: the transport seam, with an HTTP client for
//!   Expo-compatible gateways ([`HttpPushGateway`])
//! - [`PushConfig`]: environment-driven gateway configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use database::Database;
//! use push_dispatch::{HttpPushGateway, PushConfig, PushDispatch};
//! use rider_core::HeadlessPlatform;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PushConfig::from_env()?;
//! let gateway = Arc::new(HttpPushGateway::new(config.clone())?);
//! let db = Database::connect("sqlite:rider.db?mode=rwc").await?;
//! db.migrate().await?;
//!
//! let dispatch = PushDispatch::new(
//!     db,
//!     gateway,
//!     Arc::new(HeadlessPlatform),
//!     config,
//!     Duration::from_secs(10),
//! );
//!
//! let outcome = dispatch
//!     .send("bea", "Emergency Alert", "Alex: thrown at fence 4", &serde_json::json!({}))
//!     .await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod types;

pub use config::{PushConfig, DEFAULT_CHANNEL_ID, DEFAULT_GATEWAY_URL};
pub use dispatch::{PushDispatch, Registration};
pub use error::PushError;
pub use gateway::{HttpPushGateway, LoggingGateway, PushGateway, RecordingGateway};
pub use types::{
    DeliveryLogEntry, DeliveryStatus, GatewayReceipt, PushMessage, PushPriority, SendOutcome,
};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
