//! Database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A rider profile, keyed by the authentication provider's stable user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Profile {
    /// Stable opaque user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Free-text description.
    pub description: String,
    /// Years of riding experience.
    pub experience: i64,
    /// Whether the user is a pro member, derived from experience and `pro_explicit`.
    pub is_pro_member: bool,
    /// Pro membership granted outright (e.g. by a purchase).
    pub pro_explicit: bool,
    /// Avatar reference, if one was uploaded.
    pub profile_image_url: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl Profile {
    /// Build a fresh profile with empty optional fields.
    ///
    /// Timestamps are left empty; the database stamps them on insert.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age: 0,
            description: String::new(),
            experience: 0,
            is_pro_member: false,
            pro_explicit: false,
            profile_image_url: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

/// Status of a directed friendship row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Blocked,
}

impl FriendStatus {
    /// Column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendStatus::Pending => "pending",
            FriendStatus::Accepted => "accepted",
            FriendStatus::Blocked => "blocked",
        }
    }

    /// Parse a stored column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(FriendStatus::Pending),
            "accepted" => Some(FriendStatus::Accepted),
            "blocked" => Some(FriendStatus::Blocked),
            _ => None,
        }
    }
}

/// A directed friendship row. A logical relationship may be stored as one or two rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Friendship {
    /// Auto-incrementing ID.
    pub id: i64,
    /// Requesting side.
    pub user_id: String,
    /// Receiving side.
    pub friend_id: String,
    /// Raw status column (`pending`, `accepted`, `blocked`).
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl Friendship {
    /// Parsed status, `None` if the column holds an unknown value.
    pub fn status(&self) -> Option<FriendStatus> {
        FriendStatus::parse(&self.status)
    }

    /// The endpoint that is not `user_id`, if `user_id` is part of this edge.
    pub fn other_party(&self, user_id: &str) -> Option<&str> {
        if self.user_id == user_id {
            Some(&self.friend_id)
        } else if self.friend_id == user_id {
            Some(&self.user_id)
        } else {
            None
        }
    }
}

/// A registered device push token. One active token per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PushToken {
    pub user_id: String,
    pub push_token: String,
    pub updated_at: String,
}

/// A row of the append-only notification audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    /// Auto-incrementing ID.
    pub id: i64,
    /// Alert the row belongs to, if it was produced by an alert fan-out.
    pub alert_id: Option<String>,
    pub recipient_user_id: String,
    pub sender_user_id: String,
    /// Notification type (e.g. "fall_detected", "manual").
    pub notification_type: String,
    pub title: String,
    pub body: String,
    /// JSON payload as delivered to the gateway.
    pub data: String,
    /// Delivery status (`sent`, `failed`, `no_token`).
    pub delivery_status: String,
    /// Creation timestamp.
    pub created_at: String,
}

/// Fields for a new audit log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification<'a> {
    pub alert_id: Option<&'a str>,
    pub recipient_user_id: &'a str,
    pub sender_user_id: &'a str,
    pub notification_type: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub data: &'a str,
    pub delivery_status: &'a str,
}

/// A mirrored emergency contact designation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmergencyFriend {
    pub user_id: String,
    pub friend_id: String,
    pub created_at: String,
}
