//! Error types for push-dispatch.

use thiserror::Error;

/// Errors that can occur when talking to the push gateway.
#[derive(Debug, Error)]
pub enum PushError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The gateway acknowledged the request with an error ticket.
    #[error("gateway rejected message: {0}")]
    Rejected(String),

    /// The gateway did not answer within the deadline.
    #[error("gateway timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
