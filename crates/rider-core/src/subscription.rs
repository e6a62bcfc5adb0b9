//! Subscription snapshot kept on device for offline pro-member checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::local_store::{LocalStore, StoreKey};

/// Last known subscription state of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    /// Plan identifier (e.g. "pro_monthly").
    pub plan: String,
    /// Whether the store reported the subscription as active.
    pub active: bool,
    /// Whether this is a trial period.
    #[serde(default)]
    pub is_trial: bool,
    /// End of the paid or trial period, if known.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionSnapshot {
    /// Whether the snapshot grants pro access at `now`.
    pub fn grants_pro_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |end| end > now)
    }
}

impl LocalStore {
    /// Load the subscription snapshot of a user.
    pub async fn subscription(&self, user_id: &str) -> Result<Option<SubscriptionSnapshot>> {
        self.get(&StoreKey::CurrentSubscription(user_id.to_string()))
            .await
    }

    /// Replace the subscription snapshot of a user. Trials also set `trial_used`.
    pub async fn save_subscription(&self, user_id: &str, snapshot: &SubscriptionSnapshot) -> Result<()> {
        self.put(&StoreKey::CurrentSubscription(user_id.to_string()), snapshot)
            .await?;
        if snapshot.is_trial {
            self.mark_trial_used().await?;
        }
        Ok(())
    }

    /// Record that a trial was started on this install.
    pub async fn mark_trial_used(&self) -> Result<()> {
        self.put_raw(&StoreKey::TrialUsed, "true").await
    }

    /// Whether a trial was ever started on this install.
    pub async fn trial_used(&self) -> Result<bool> {
        Ok(self
            .get_raw(&StoreKey::TrialUsed)
            .await?
            .is_some_and(|v| v == "true"))
    }
}
