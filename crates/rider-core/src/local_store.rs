//! Per-user namespaced durable key/value store.
//!
//! Every per-user key lives in a namespace equal to the user id, so one
//! account can never read another account's values after a user switch, and
//! sign-out can drop a user's state with a single namespace clear.

use std::time::Duration;

use database::{kv, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::deadline::with_deadline;
use crate::error::{CoreError, Result};

/// Namespace for install-wide keys that are not tied to a user.
pub const INSTALL_NAMESPACE: &str = "_install";

/// Keys used by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// `emergency_friends_<userId>`: the full emergency contact list.
    EmergencyFriends(String),
    /// `tutorial_progress_<userId>`: map of tutorial id to progress.
    TutorialProgress(String),
    /// `alert_history_<userId>`: recent alert records.
    AlertHistory(String),
    /// `current_subscription_<userId>`: subscription snapshot.
    CurrentSubscription(String),
    /// `trial_used`: set once a trial was ever started on this install.
    TrialUsed,
}

impl StoreKey {
    /// Namespace the key is stored under.
    pub fn namespace(&self) -> &str {
        match self {
            StoreKey::EmergencyFriends(user)
            | StoreKey::TutorialProgress(user)
            | StoreKey::AlertHistory(user)
            | StoreKey::CurrentSubscription(user) => user,
            StoreKey::TrialUsed => INSTALL_NAMESPACE,
        }
    }

    /// Full key name.
    pub fn name(&self) -> String {
        match self {
            StoreKey::EmergencyFriends(user) => format!("emergency_friends_{}", user),
            StoreKey::TutorialProgress(user) => format!("tutorial_progress_{}", user),
            StoreKey::AlertHistory(user) => format!("alert_history_{}", user),
            StoreKey::CurrentSubscription(user) => format!("current_subscription_{}", user),
            StoreKey::TrialUsed => "trial_used".to_string(),
        }
    }
}

/// Durable key/value store with JSON-encoded values.
#[derive(Debug, Clone)]
pub struct LocalStore {
    db: Database,
    timeout: Duration,
}

impl LocalStore {
    /// Wrap an on-device database.
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Read a raw string value.
    pub async fn get_raw(&self, key: &StoreKey) -> Result<Option<String>> {
        let name = key.name();
        with_deadline(
            "local_store.get",
            self.timeout,
            kv::get(self.db.pool(), key.namespace(), &name),
        )
        .await
    }

    /// Write a raw string value.
    pub async fn put_raw(&self, key: &StoreKey, value: &str) -> Result<()> {
        let name = key.name();
        debug!(key = %name, bytes = value.len(), "Writing local value");
        with_deadline(
            "local_store.put",
            self.timeout,
            kv::put(self.db.pool(), key.namespace(), &name, value),
        )
        .await
    }

    /// Read and decode a JSON value.
    pub async fn get<T: DeserializeOwned>(&self, key: &StoreKey) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| CoreError::Storage {
                    key: key.name(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Encode and write a JSON value, replacing the whole key.
    pub async fn put<T: Serialize>(&self, key: &StoreKey, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|source| CoreError::Storage {
            key: key.name(),
            source,
        })?;
        self.put_raw(key, &raw).await
    }

    /// Delete a key. Returns true if it existed.
    pub async fn remove(&self, key: &StoreKey) -> Result<bool> {
        let name = key.name();
        with_deadline(
            "local_store.remove",
            self.timeout,
            kv::delete(self.db.pool(), key.namespace(), &name),
        )
        .await
    }

    /// Delete every key scoped to `user_id`. Returns the number removed.
    pub async fn clear_user(&self, user_id: &str) -> Result<u64> {
        if user_id == INSTALL_NAMESPACE {
            return Err(CoreError::validation("refusing to clear the install namespace"));
        }
        with_deadline(
            "local_store.clear_user",
            self.timeout,
            kv::clear_namespace(self.db.pool(), user_id),
        )
        .await
    }

    /// Keys currently stored for `user_id`.
    pub async fn user_keys(&self, user_id: &str) -> Result<Vec<String>> {
        with_deadline(
            "local_store.keys",
            self.timeout,
            kv::keys(self.db.pool(), user_id),
        )
        .await
    }
}
