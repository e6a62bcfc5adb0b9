//! Wire types for the push gateway and classified delivery results.

use serde::{Deserialize, Serialize};

use crate::config::PushConfig;

/// Delivery priority requested from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushPriority {
    Default,
    Normal,
    High,
}

/// A single outbound push message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Recipient device token.
    pub to: String,
    pub title: String,
    pub body: String,
    /// Opaque payload delivered to the recipient app.
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    pub priority: PushPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl PushMessage {
    /// Create a high-priority message using the configured sound and channel.
    pub fn new(
        to: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        data: serde_json::Value,
        config: &PushConfig,
    ) -> Self {
        Self {
            to: to.into(),
            title: title.into(),
            body: body.into(),
            data,
            sound: Some(config.sound.clone()),
            priority: PushPriority::High,
            channel_id: Some(config.channel_id.clone()),
        }
    }
}

/// Gateway response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct PushResponse {
    pub data: Option<PushTicket>,
    #[serde(default)]
    pub errors: Vec<PushResponseError>,
}

/// Per-message acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PushTicket {
    pub status: String,
    pub id: Option<String>,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Request-level error reported by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PushResponseError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Successful gateway acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayReceipt {
    /// Gateway ticket id, if one was issued.
    pub ticket_id: Option<String>,
}

/// Classified result of a single send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The gateway accepted the message.
    Sent { ticket_id: Option<String> },
    /// The recipient has no registered token.
    NoToken,
    /// Token lookup or gateway submission failed.
    GatewayError { reason: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }

    /// Status recorded in the audit log.
    pub fn delivery_status(&self) -> DeliveryStatus {
        match self {
            SendOutcome::Sent { .. } => DeliveryStatus::Sent,
            SendOutcome::NoToken => DeliveryStatus::NoToken,
            SendOutcome::GatewayError { .. } => DeliveryStatus::Failed,
        }
    }
}

/// Delivery status of one audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    NoToken,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::NoToken => "no_token",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            "no_token" => Some(DeliveryStatus::NoToken),
            _ => None,
        }
    }
}

/// One per-target row to append to the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryLogEntry {
    pub recipient_user_id: String,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub status: DeliveryStatus,
}
