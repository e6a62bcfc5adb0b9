//! Device platform seam: push permission, geolocation and local notifications.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoreError;
use crate::location::Coordinates;

/// Priority of a notification shown on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Default,
    High,
    Max,
}

/// A notification presented on the local device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Device capabilities the core depends on.
///
/// Abstracted to support different hosts (mobile shells, tests, headless drills).
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    /// Obtain a native push token through the permission flow.
    ///
    /// Returns `None` when permission is denied or the device cannot issue one.
    async fn request_push_token(&self) -> Option<String>;

    /// Current position, `None` if geolocation is unavailable.
    async fn current_location(&self) -> Option<Coordinates>;

    /// Present a notification on this device.
    async fn show_local_notification(&self, notification: LocalNotification) -> Result<(), CoreError>;
}

/// A platform with no push or location support that logs local notifications.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPlatform;

#[async_trait]
impl DevicePlatform for HeadlessPlatform {
    async fn request_push_token(&self) -> Option<String> {
        None
    }

    async fn current_location(&self) -> Option<Coordinates> {
        None
    }

    async fn show_local_notification(&self, notification: LocalNotification) -> Result<(), CoreError> {
        info!(
            priority = ?notification.priority,
            "[local notification] {}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// A scripted platform that records every local notification.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    token: Mutex<Option<String>>,
    location: Mutex<Option<Coordinates>>,
    notifications: Mutex<Vec<LocalNotification>>,
}

impl RecordingPlatform {
    /// Create a platform without token or location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue `token` from the push permission flow.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Report `coordinates` as the current position.
    pub fn with_location(self, coordinates: Coordinates) -> Self {
        self.set_location(Some(coordinates));
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token;
        }
    }

    pub fn set_location(&self, location: Option<Coordinates>) {
        if let Ok(mut guard) = self.location.lock() {
            *guard = location;
        }
    }

    /// Notifications shown so far.
    pub fn notifications(&self) -> Vec<LocalNotification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DevicePlatform for RecordingPlatform {
    async fn request_push_token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    async fn current_location(&self) -> Option<Coordinates> {
        self.location.lock().ok().and_then(|l| *l)
    }

    async fn show_local_notification(&self, notification: LocalNotification) -> Result<(), CoreError> {
        if let Ok(mut shown) = self.notifications.lock() {
            shown.push(notification);
        }
        Ok(())
    }
}
