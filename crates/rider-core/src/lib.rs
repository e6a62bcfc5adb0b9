//! Shared building blocks of the rider-safety core.
//!
//! This crate provides:
//!
//! - [`CoreError`] / [`ErrorKind`]: the typed outcomes every component returns
//! - [`IdentityGateway`]: the authenticated-user cache and profile read/update
//! - [`LocalStore`]: the per-user namespaced durable key/value store
//! - [`DevicePlatform`]: push permission, geolocation and local notifications
//! - [`CoreConfig`]: environment-driven configuration and operation deadlines
//!
//! # Example
//!
//! ```no_run
//! use database::Database;
//! use rider_core::{AuthPrincipal, CoreConfig, IdentityGateway, LocalStore, StoreKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoreConfig::from_env()?;
//! let remote = Database::connect(&config.database_url).await?;
//! remote.migrate().await?;
//!
//! let identity = IdentityGateway::new(remote, config.remote_timeout);
//! let alex = identity
//!     .sign_in(AuthPrincipal {
//!         user_id: "alex".to_string(),
//!         display_name: Some("Alex".to_string()),
//!     })
//!     .await?;
//!
//! let local = Database::connect(&config.local_store_url).await?;
//! local.migrate().await?;
//! let store = LocalStore::new(local, config.local_timeout);
//! let raw = store.get_raw(&StoreKey::EmergencyFriends(alex.id.clone())).await?;
//! println!("stored contacts: {:?}", raw);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod identity;
pub mod local_store;
pub mod location;
pub mod platform;
pub mod subscription;

pub use config::{ConfigError, CoreConfig};
pub use deadline::with_deadline;
pub use error::{Conflict, CoreError, ErrorKind, Result};
pub use identity::{
    derive_pro_member, AuthPrincipal, IdentityGateway, ProfilePatch, User, FALLBACK_DISPLAY_NAME,
    PRO_EXPERIENCE_YEARS,
};
pub use local_store::{LocalStore, StoreKey, INSTALL_NAMESPACE};
pub use location::{Coordinates, Location};
pub use platform::{
    DevicePlatform, HeadlessPlatform, LocalNotification, NotificationPriority, RecordingPlatform,
};
pub use subscription::SubscriptionSnapshot;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
