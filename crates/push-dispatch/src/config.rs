//! Configuration for the push gateway client.

use std::env;
use std::time::Duration;

use rider_core::config::secs_var;

use crate::error::PushError;

/// Default gateway endpoint (Expo push service).
pub const DEFAULT_GATEWAY_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Default Android notification channel for alerts.
pub const DEFAULT_CHANNEL_ID: &str = "emergency-alerts";

/// Push gateway configuration.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Gateway endpoint URL.
    pub gateway_url: String,
    /// Optional bearer token for the gateway.
    pub access_token: Option<String>,
    /// Notification channel the recipient device should use.
    pub channel_id: String,
    /// Sound to play on the recipient device.
    pub sound: String,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            access_token: None,
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
            sound: "default".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl PushConfig {
    /// Create configuration with a specific gateway URL.
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `PUSH_GATEWAY_URL` | Gateway endpoint | Expo push send URL |
    /// | `PUSH_ACCESS_TOKEN` | Bearer token | none |
    /// | `PUSH_CHANNEL_ID` | Android channel | `emergency-alerts` |
    /// | `PUSH_TIMEOUT_SECS` | Request deadline | `15` |
    pub fn from_env() -> Result<Self, PushError> {
        let defaults = Self::default();

        let gateway_url = env::var("PUSH_GATEWAY_URL").unwrap_or(defaults.gateway_url);
        validate_url(&gateway_url)?;

        let access_token = env::var("PUSH_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let channel_id = env::var("PUSH_CHANNEL_ID").unwrap_or(defaults.channel_id);

        Ok(Self {
            gateway_url,
            access_token,
            channel_id,
            sound: defaults.sound,
            timeout: secs_var("PUSH_TIMEOUT_SECS", defaults.timeout),
        })
    }
}

fn validate_url(url: &str) -> Result<(), PushError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(PushError::Config(format!(
            "gateway URL must be http(s): {}",
            url
        )))
    }
}
