//! Error types surfaced by every rider-safety component.

use std::time::Duration;

use database::DatabaseError;
use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`CoreError`], stable for UI mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Validation,
    NotFriend,
    ProRequired,
    Timeout,
    Network,
    GatewayError,
    NoToken,
    NoTargets,
    Conflict,
    Storage,
}

/// Why a write was rejected as conflicting with existing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    AlreadyFriends,
    AlreadySent,
    Blocked,
    Exists { entity: &'static str, id: String },
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::AlreadyFriends => write!(f, "already friends"),
            Conflict::AlreadySent => write!(f, "already sent"),
            Conflict::Blocked => write!(f, "relationship is blocked"),
            Conflict::Exists { entity, id } => write!(f, "{} already exists: {}", entity, id),
        }
    }
}

/// Errors returned by core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No signed-in user.
    #[error("not signed in")]
    Unauthenticated,

    /// Input violates a stated invariant.
    #[error("{0}")]
    Validation(String),

    /// Target is not an accepted friend of the current user.
    #[error("{0} is not an accepted friend")]
    NotFriend(String),

    /// Content requires a pro membership.
    #[error("{0} requires a pro membership")]
    ProRequired(String),

    /// Operation exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Remote or durable store failure.
    #[error("network error: {0}")]
    Network(#[source] DatabaseError),

    /// Push gateway failure.
    #[error("push gateway error: {0}")]
    Gateway(String),

    /// Recipient has no registered push token.
    #[error("no push token registered for {0}")]
    NoToken(String),

    /// Alert requested with no enabled emergency contacts.
    #[error("no enabled emergency contacts")]
    NoTargets,

    /// Write conflicts with existing state.
    #[error("{0}")]
    Conflict(Conflict),

    /// A stored local value could not be decoded.
    #[error("stored value {key} is unreadable: {source}")]
    Storage {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unauthenticated => ErrorKind::Unauthenticated,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFriend(_) => ErrorKind::NotFriend,
            CoreError::ProRequired(_) => ErrorKind::ProRequired,
            CoreError::Timeout { .. } => ErrorKind::Timeout,
            CoreError::Network(_) => ErrorKind::Network,
            CoreError::Gateway(_) => ErrorKind::GatewayError,
            CoreError::NoToken(_) => ErrorKind::NoToken,
            CoreError::NoTargets => ErrorKind::NoTargets,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Storage { .. } => ErrorKind::Storage,
        }
    }
}

impl From<DatabaseError> for CoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::AlreadyExists { entity, id } => {
                CoreError::Conflict(Conflict::Exists { entity, id })
            }
            other => CoreError::Network(other),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
