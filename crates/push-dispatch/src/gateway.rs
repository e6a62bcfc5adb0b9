//! Push gateway trait and implementations.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::error::PushError;
use crate::types::{GatewayReceipt, PushMessage, PushResponse};

/// Submits push messages to an external delivery service.
///
/// Abstracted to support different transports (HTTP gateway, tests, drills).
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Submit a single message. No retries are performed.
    async fn submit(&self, message: &PushMessage) -> Result<GatewayReceipt, PushError>;
}

/// HTTP client for an Expo-compatible push gateway.
#[derive(Clone)]
pub struct HttpPushGateway {
    http: Client,
    config: PushConfig,
}

impl HttpPushGateway {
    /// Build a client for the configured gateway.
    pub fn new(config: PushConfig) -> Result<Self, PushError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PushError::Http)?;

        info!(url = %config.gateway_url, "Push gateway client ready");
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn submit(&self, message: &PushMessage) -> Result<GatewayReceipt, PushError> {
        let mut request = self
            .http
            .post(&self.config.gateway_url)
            .header("Accept", "application/json")
            .json(message);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%status, "Push gateway responded");

        classify(status, &text)
    }
}

/// Map a gateway reply onto a receipt or a rejection.
///
/// Request-level `errors` win over the ticket. A body that is not JSON is a
/// rejection on a non-2xx status and a decode error otherwise.
fn classify(status: StatusCode, text: &str) -> Result<GatewayReceipt, PushError> {
    let parsed: PushResponse = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => {
            return Err(PushError::Rejected(format!("HTTP {}: {}", status, text)));
        }
        Err(err) => return Err(PushError::Json(err)),
    };

    if let Some(first) = parsed.errors.first() {
        let code = first.code.as_deref().unwrap_or("UNKNOWN");
        return Err(PushError::Rejected(format!("{}: {}", code, first.message)));
    }

    match parsed.data {
        Some(ticket) if ticket.status == "ok" => Ok(GatewayReceipt {
            ticket_id: ticket.id,
        }),
        Some(ticket) => {
            let detail = ticket
                .details
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|e| e.as_str())
                .map(str::to_string);
            let message = ticket.message.unwrap_or_else(|| ticket.status.clone());
            Err(PushError::Rejected(match detail {
                Some(detail) => format!("{} ({})", message, detail),
                None => message,
            }))
        }
        None if status.is_success() => Ok(GatewayReceipt::default()),
        None => Err(PushError::Rejected(format!("HTTP {}", status))),
    }
}

/// A gateway that logs every message and reports success.
#[derive(Debug, Clone, Default)]
pub struct LoggingGateway;

#[async_trait]
impl PushGateway for LoggingGateway {
    async fn submit(&self, message: &PushMessage) -> Result<GatewayReceipt, PushError> {
        info!(to = %message.to, "[push] {}: {}", message.title, message.body);
        Ok(GatewayReceipt::default())
    }
}

/// A gateway that records submissions and rejects configured tokens.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    failing_tokens: Mutex<HashSet<String>>,
    submitted: Mutex<Vec<PushMessage>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission addressed to `token`.
    pub fn fail_token(&self, token: impl Into<String>) {
        if let Ok(mut failing) = self.failing_tokens.lock() {
            failing.insert(token.into());
        }
    }

    /// Messages submitted so far, including rejected ones.
    pub fn submitted(&self) -> Vec<PushMessage> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn submit(&self, message: &PushMessage) -> Result<GatewayReceipt, PushError> {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(message.clone());
        }

        let rejected = self
            .failing_tokens
            .lock()
            .map(|f| f.contains(&message.to))
            .unwrap_or(false);
        if rejected {
            warn!(to = %message.to, "Recording gateway rejecting message");
            return Err(PushError::Rejected("DeviceNotRegistered".to_string()));
        }

        Ok(GatewayReceipt {
            ticket_id: Some(format!("ticket-{}", message.to)),
        })
    }
}
