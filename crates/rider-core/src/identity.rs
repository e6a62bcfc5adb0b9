//! Identity & profile gateway.
//!
//! Holds the authenticated-user cache, one of the two pieces of process-wide
//! state in the core. A `None` principal disables every write operation in
//! the other components.

use std::time::Duration;

use database::{profile, Database, Profile};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::deadline::with_deadline;
use crate::error::{Conflict, CoreError, Result};

/// A user as seen by the core.
pub type User = Profile;

/// Years of experience at which a rider is treated as a pro member.
pub const PRO_EXPERIENCE_YEARS: i64 = 5;

/// Display name used when a user has none.
pub const FALLBACK_DISPLAY_NAME: &str = "Rider";

const MAX_NAME_LENGTH: usize = 64;
const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_AGE: i64 = 130;

/// The principal produced by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPrincipal {
    /// Stable user id from the auth provider.
    pub user_id: String,
    /// Name supplied by the provider, used when creating the profile.
    pub display_name: Option<String>,
}

/// Shallow profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub description: Option<String>,
    pub experience: Option<i64>,
    pub is_pro_member: Option<bool>,
    /// `Some(None)` clears the avatar.
    pub profile_image_url: Option<Option<String>>,
}

/// `pro_member := experience >= 5 || explicitly_set`.
pub fn derive_pro_member(experience: i64, explicitly_set: bool) -> bool {
    experience >= PRO_EXPERIENCE_YEARS || explicitly_set
}

impl ProfilePatch {
    /// Apply onto `base`, returning the merged profile.
    pub fn apply(&self, base: &User) -> Result<User> {
        let mut merged = base.clone();

        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::validation("name cannot be empty"));
            }
            if name.chars().count() > MAX_NAME_LENGTH {
                return Err(CoreError::validation(format!(
                    "name is too long (max {} chars)",
                    MAX_NAME_LENGTH
                )));
            }
            merged.name = name.to_string();
        }
        if let Some(age) = self.age {
            if !(0..=MAX_AGE).contains(&age) {
                return Err(CoreError::validation(format!("age {} is out of range", age)));
            }
            merged.age = age;
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(CoreError::validation(format!(
                    "description is too long (max {} chars)",
                    MAX_DESCRIPTION_LENGTH
                )));
            }
            merged.description = description.clone();
        }
        if let Some(experience) = self.experience {
            if experience < 0 {
                return Err(CoreError::validation("experience cannot be negative"));
            }
            merged.experience = experience;
        }
        if let Some(url) = &self.profile_image_url {
            merged.profile_image_url = url.clone();
        }

        merged.pro_explicit = self.is_pro_member.unwrap_or(base.pro_explicit);
        merged.is_pro_member = derive_pro_member(merged.experience, merged.pro_explicit);

        Ok(merged)
    }
}

/// Resolves the current user and exposes profile reads and updates.
#[derive(Debug)]
pub struct IdentityGateway {
    db: Database,
    current: RwLock<Option<User>>,
    timeout: Duration,
}

impl IdentityGateway {
    /// Create a gateway with no signed-in user.
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self {
            db,
            current: RwLock::new(None),
            timeout,
        }
    }

    /// Record a successful authentication, creating the profile on first sign-in.
    pub async fn sign_in(&self, principal: AuthPrincipal) -> Result<User> {
        if principal.user_id.trim().is_empty() {
            return Err(CoreError::validation("user id cannot be empty"));
        }

        let user = match self.get_profile(&principal.user_id).await? {
            Some(existing) => existing,
            None => self.create_profile(&principal).await?,
        };

        info!(user_id = %user.id, "Signed in");
        *self.current.write().await = Some(user.clone());
        Ok(user)
    }

    async fn create_profile(&self, principal: &AuthPrincipal) -> Result<User> {
        let name = principal
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME);
        let fresh = Profile::new(principal.user_id.clone(), name);

        match with_deadline(
            "identity.create_profile",
            self.timeout,
            profile::create_profile(self.db.pool(), &fresh),
        )
        .await
        {
            Ok(()) => info!(user_id = %fresh.id, "Created profile on first sign-in"),
            // A concurrent sign-in created it first.
            Err(CoreError::Conflict(Conflict::Exists { .. })) => {}
            Err(err) => return Err(err),
        }

        self.get_profile(&principal.user_id)
            .await?
            .ok_or_else(|| CoreError::validation("profile vanished after creation"))
    }

    /// The signed-in user, if any.
    pub async fn current_user(&self) -> Option<User> {
        self.current.read().await.clone()
    }

    /// The signed-in user, or `Unauthenticated`.
    pub async fn require_user(&self) -> Result<User> {
        self.current_user().await.ok_or(CoreError::Unauthenticated)
    }

    /// Require that `user_id` is the signed-in user.
    pub async fn require_self(&self, user_id: &str) -> Result<User> {
        let user = self.require_user().await?;
        if user.id != user_id {
            warn!(user_id, current = %user.id, "Write attempted for another user");
            return Err(CoreError::Unauthenticated);
        }
        Ok(user)
    }

    /// Fetch a profile by id.
    pub async fn get_profile(&self, id: &str) -> Result<Option<User>> {
        with_deadline(
            "identity.get_profile",
            self.timeout,
            profile::get_profile(self.db.pool(), id),
        )
        .await
    }

    /// Apply a shallow merge to the signed-in user's profile.
    pub async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> Result<User> {
        self.require_self(id).await?;

        let existing = self
            .get_profile(id)
            .await?
            .ok_or_else(|| CoreError::validation(format!("profile {} does not exist", id)))?;
        let merged = patch.apply(&existing)?;

        with_deadline(
            "identity.update_profile",
            self.timeout,
            profile::update_profile(self.db.pool(), &merged),
        )
        .await?;

        let stored = self.get_profile(id).await?.unwrap_or(merged);
        *self.current.write().await = Some(stored.clone());
        info!(user_id = %id, "Profile updated");
        Ok(stored)
    }

    /// Drop the authenticated-user cache, returning the user that was signed in.
    pub async fn sign_out(&self) -> Option<User> {
        let previous = self.current.write().await.take();
        if let Some(user) = &previous {
            info!(user_id = %user.id, "Signed out");
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    async fn gateway() -> IdentityGateway {
        IdentityGateway::new(Database::in_memory().await.unwrap(), Duration::from_secs(5))
    }

    fn principal(id: &str, name: Option<&str>) -> AuthPrincipal {
        AuthPrincipal {
            user_id: id.to_string(),
            display_name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_derive_pro_member() {
        assert!(derive_pro_member(5, false));
        assert!(derive_pro_member(0, true));
        assert!(!derive_pro_member(4, false));
    }

    #[tokio::test]
    async fn test_sign_in_creates_profile_once() {
        let identity = gateway().await;
        assert!(identity.current_user().await.is_none());

        let first = identity.sign_in(principal("alex", Some("Alex"))).await.unwrap();
        assert_eq!(first.name, "Alex");

        identity.sign_out().await;
        let second = identity.sign_in(principal("alex", Some("Other"))).await.unwrap();
        assert_eq!(second.name, "Alex");
        assert_eq!(identity.current_user().await.unwrap().id, "alex");
    }

    #[tokio::test]
    async fn test_sign_in_without_name_uses_fallback() {
        let identity = gateway().await;
        let user = identity.sign_in(principal("anon", None)).await.unwrap();
        assert_eq!(user.name, FALLBACK_DISPLAY_NAME);
    }

    #[tokio::test]
    async fn test_update_requires_sign_in() {
        let identity = gateway().await;
        let err = identity
            .update_profile("alex", &ProfilePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_update_merges_and_derives_pro() {
        let identity = gateway().await;
        identity.sign_in(principal("alex", Some("Alex"))).await.unwrap();

        let patch = ProfilePatch {
            experience: Some(6),
            description: Some("Eventing".to_string()),
            ..Default::default()
        };
        let updated = identity.update_profile("alex", &patch).await.unwrap();
        assert_eq!(updated.name, "Alex");
        assert_eq!(updated.description, "Eventing");
        assert!(updated.is_pro_member);
        assert!(identity.current_user().await.unwrap().is_pro_member);
    }

    #[tokio::test]
    async fn test_pro_follows_experience_unless_granted() {
        let identity = gateway().await;
        identity.sign_in(principal("alex", Some("Alex"))).await.unwrap();

        let raise = ProfilePatch {
            experience: Some(6),
            ..Default::default()
        };
        assert!(identity.update_profile("alex", &raise).await.unwrap().is_pro_member);

        let lower = ProfilePatch {
            experience: Some(2),
            ..Default::default()
        };
        let demoted = identity.update_profile("alex", &lower).await.unwrap();
        assert!(!demoted.is_pro_member);
        assert!(!demoted.pro_explicit);

        let grant = ProfilePatch {
            is_pro_member: Some(true),
            ..Default::default()
        };
        identity.update_profile("alex", &grant).await.unwrap();
        let still_pro = identity.update_profile("alex", &lower).await.unwrap();
        assert!(still_pro.is_pro_member);
        assert!(still_pro.pro_explicit);
    }

    #[tokio::test]
    async fn test_cannot_update_someone_else() {
        let identity = gateway().await;
        identity.sign_in(principal("alex", Some("Alex"))).await.unwrap();
        identity.sign_out().await;
        identity.sign_in(principal("bea", Some("Bea"))).await.unwrap();

        let err = identity
            .update_profile("alex", &ProfilePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn test_patch_validation() {
        let base = Profile::new("alex", "Alex");
        let blank = ProfilePatch {
            name: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(blank.apply(&base).is_err());

        let old = ProfilePatch {
            age: Some(200),
            ..Default::default()
        };
        assert!(old.apply(&base).is_err());

        let clear_avatar = ProfilePatch {
            profile_image_url: Some(None),
            ..Default::default()
        };
        let with_avatar = Profile {
            profile_image_url: Some("avatars/alex.png".to_string()),
            ..base
        };
        assert!(clear_avatar.apply(&with_avatar).unwrap().profile_image_url.is_none());
    }

    #[test]
    fn test_derived_pro_is_not_sticky() {
        let veteran = Profile {
            experience: 8,
            is_pro_member: true,
            ..Profile::new("alex", "Alex")
        };
        let lower = ProfilePatch {
            experience: Some(1),
            ..Default::default()
        };
        assert!(!lower.apply(&veteran).unwrap().is_pro_member);
    }
}
