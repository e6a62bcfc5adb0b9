//! Emergency contact manager.
//!
//! The canonical list lives in the local store as a single JSON value under
//! `emergency_friends_<userId>`. Every mutation reads, modifies and writes the
//! whole list while holding the manager's write lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use database::{emergency_mirror, Database};
use rider_core::{with_deadline, CoreError, IdentityGateway, LocalStore, Result, StoreKey, User};
use serde::{Deserialize, Serialize};
use social_graph::SocialGraph;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum number of emergency contacts per rider.
pub const MAX_EMERGENCY_CONTACTS: usize = 3;

/// A friend designated to receive alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub local_id: String,
    pub friend_user_id: String,
    pub cached_display_name: String,
    #[serde(default)]
    pub cached_avatar_ref: Option<String>,
    pub enabled: bool,
    pub added_at: DateTime<Utc>,
}

impl EmergencyContact {
    fn from_user(user: &User) -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            friend_user_id: user.id.clone(),
            cached_display_name: user.name.clone(),
            cached_avatar_ref: user.profile_image_url.clone(),
            enabled: true,
            added_at: Utc::now(),
        }
    }
}

/// Maintains the signed-in rider's emergency contacts.
pub struct EmergencyContactManager {
    identity: Arc<IdentityGateway>,
    graph: Arc<SocialGraph>,
    store: LocalStore,
    remote: Database,
    remote_timeout: Duration,
    write_lock: Mutex<()>,
}

impl EmergencyContactManager {
    pub fn new(
        identity: Arc<IdentityGateway>,
        graph: Arc<SocialGraph>,
        store: LocalStore,
        remote: Database,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            graph,
            store,
            remote,
            remote_timeout,
            write_lock: Mutex::new(()),
        }
    }

    /// All contacts of the signed-in rider, in insertion order. Local only.
    pub async fn list(&self) -> Result<Vec<EmergencyContact>> {
        let user = self.identity.require_user().await?;
        self.load(&user.id).await
    }

    /// Contacts that should receive alerts.
    ///
    /// Entries whose friendship has since been removed are still returned.
    pub async fn enabled_targets(&self) -> Result<Vec<EmergencyContact>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|c| c.enabled)
            .collect())
    }

    /// Designate an accepted friend as an emergency contact.
    pub async fn add(&self, candidate: &User) -> Result<EmergencyContact> {
        let user = self.identity.require_user().await?;
        let _guard = self.write_lock.lock().await;

        let mut contacts = self.load(&user.id).await?;
        if contacts.len() >= MAX_EMERGENCY_CONTACTS {
            return Err(CoreError::validation(format!(
                "emergency contact limit of {} reached",
                MAX_EMERGENCY_CONTACTS
            )));
        }
        if !self.graph.are_friends(&user.id, &candidate.id).await? {
            return Err(CoreError::NotFriend(candidate.id.clone()));
        }
        if contacts.iter().any(|c| c.friend_user_id == candidate.id) {
            return Err(CoreError::validation(format!(
                "{} is already an emergency contact",
                candidate.name
            )));
        }

        let contact = EmergencyContact::from_user(candidate);
        contacts.push(contact.clone());
        self.save(&user.id, &contacts).await?;
        info!(user_id = %user.id, friend_id = %candidate.id, "Emergency contact added");

        self.mirror_add(&user.id, &candidate.id).await;
        Ok(contact)
    }

    /// Remove a contact by local id.
    pub async fn remove(&self, local_id: &str) -> Result<EmergencyContact> {
        let user = self.identity.require_user().await?;
        let _guard = self.write_lock.lock().await;

        let mut contacts = self.load(&user.id).await?;
        let index = position(&contacts, local_id)?;
        let removed = contacts.remove(index);
        self.save(&user.id, &contacts).await?;
        info!(user_id = %user.id, friend_id = %removed.friend_user_id, "Emergency contact removed");

        self.mirror_remove(&user.id, &removed.friend_user_id).await;
        Ok(removed)
    }

    /// Enable or disable a contact.
    pub async fn toggle(&self, local_id: &str, enabled: bool) -> Result<EmergencyContact> {
        let user = self.identity.require_user().await?;
        let _guard = self.write_lock.lock().await;

        let mut contacts = self.load(&user.id).await?;
        let index = position(&contacts, local_id)?;
        contacts[index].enabled = enabled;
        self.save(&user.id, &contacts).await?;
        debug!(user_id = %user.id, local_id, enabled, "Emergency contact toggled");

        Ok(contacts[index].clone())
    }

    /// Re-read cached names and avatars from the profile gateway.
    ///
    /// Contacts whose profile cannot be read keep their cached values.
    /// Returns the number of contacts that changed.
    pub async fn refresh_cache(&self) -> Result<usize> {
        let user = self.identity.require_user().await?;
        let snapshot = self.load(&user.id).await?;

        let mut fresh = Vec::with_capacity(snapshot.len());
        for contact in &snapshot {
            match self.identity.get_profile(&contact.friend_user_id).await {
                Ok(Some(profile)) => fresh.push(profile),
                Ok(None) => debug!(friend_id = %contact.friend_user_id, "Contact profile missing"),
                Err(err) => {
                    warn!(friend_id = %contact.friend_user_id, error = %err, "Contact refresh failed")
                }
            }
        }

        let _guard = self.write_lock.lock().await;
        let mut contacts = self.load(&user.id).await?;
        let mut changed = 0;
        for contact in contacts.iter_mut() {
            let Some(profile) = fresh.iter().find(|p| p.id == contact.friend_user_id) else {
                continue;
            };
            if contact.cached_display_name != profile.name
                || contact.cached_avatar_ref != profile.profile_image_url
            {
                contact.cached_display_name = profile.name.clone();
                contact.cached_avatar_ref = profile.profile_image_url.clone();
                changed += 1;
            }
        }

        if changed > 0 {
            self.save(&user.id, &contacts).await?;
            info!(user_id = %user.id, changed, "Emergency contact cache refreshed");
        }
        Ok(changed)
    }

    async fn load(&self, user_id: &str) -> Result<Vec<EmergencyContact>> {
        Ok(self
            .store
            .get(&StoreKey::EmergencyFriends(user_id.to_string()))
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, user_id: &str, contacts: &[EmergencyContact]) -> Result<()> {
        self.store
            .put(&StoreKey::EmergencyFriends(user_id.to_string()), &contacts)
            .await
    }

    async fn mirror_add(&self, user_id: &str, friend_id: &str) {
        if let Err(err) = with_deadline(
            "contacts.mirror_add",
            self.remote_timeout,
            emergency_mirror::add(self.remote.pool(), user_id, friend_id),
        )
        .await
        {
            warn!(user_id, friend_id, error = %err, "Emergency contact mirror write failed");
        }
    }

    async fn mirror_remove(&self, user_id: &str, friend_id: &str) {
        if let Err(err) = with_deadline(
            "contacts.mirror_remove",
            self.remote_timeout,
            emergency_mirror::remove(self.remote.pool(), user_id, friend_id),
        )
        .await
        {
            warn!(user_id, friend_id, error = %err, "Emergency contact mirror delete failed");
        }
    }
}

fn position(contacts: &[EmergencyContact], local_id: &str) -> Result<usize> {
    contacts
        .iter()
        .position(|c| c.local_id == local_id)
        .ok_or_else(|| CoreError::validation(format!("no emergency contact {}", local_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::{friendship, profile, FriendStatus, Profile};
    use rider_core::{AuthPrincipal, ErrorKind};
    use social_graph::GraphTimeouts;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        remote: Database,
        identity: Arc<IdentityGateway>,
        graph: Arc<SocialGraph>,
        manager: EmergencyContactManager,
    }

    async fn fixture() -> Fixture {
        let remote = Database::in_memory().await.unwrap();
        let local = Database::in_memory().await.unwrap();
        let identity = Arc::new(IdentityGateway::new(remote.clone(), TIMEOUT));
        let graph = Arc::new(SocialGraph::new(
            remote.clone(),
            identity.clone(),
            GraphTimeouts {
                remote: TIMEOUT,
                search: TIMEOUT,
            },
        ));
        let manager = EmergencyContactManager::new(
            identity.clone(),
            graph.clone(),
            LocalStore::new(local, TIMEOUT),
            remote.clone(),
            TIMEOUT,
        );

        identity
            .sign_in(AuthPrincipal {
                user_id: "alex".to_string(),
                display_name: Some("Alex".to_string()),
            })
            .await
            .unwrap();

        Fixture {
            remote,
            identity,
            graph,
            manager,
        }
    }

    async fn befriend(f: &Fixture, id: &str, name: &str) -> User {
        let rider = Profile::new(id, name);
        profile::create_profile(f.remote.pool(), &rider).await.unwrap();
        friendship::insert_edge(f.remote.pool(), "alex", id, FriendStatus::Accepted)
            .await
            .unwrap();
        rider
    }

    #[tokio::test]
    async fn test_list_requires_sign_in() {
        let f = fixture().await;
        f.identity.sign_out().await;

        let err = f.manager.list().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_add_enforces_friendship_and_duplicates() {
        let f = fixture().await;
        let bea = befriend(&f, "bea", "Bea").await;
        let stranger = Profile::new("zed", "Zed");
        profile::create_profile(f.remote.pool(), &stranger).await.unwrap();

        let added = f.manager.add(&bea).await.unwrap();
        assert!(added.enabled);
        assert_eq!(added.cached_display_name, "Bea");

        let dup = f.manager.add(&bea).await.unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::Validation);

        let err = f.manager.add(&stranger).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFriend);

        assert_eq!(f.manager.list().await.unwrap().len(), 1);

        let mirrored = emergency_mirror::list(f.remote.pool(), "alex").await.unwrap();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].friend_id, "bea");
    }

    #[tokio::test]
    async fn test_limit_of_three() {
        let f = fixture().await;
        for (id, name) in [("bea", "Bea"), ("cam", "Cam"), ("dee", "Dee")] {
            let friend = befriend(&f, id, name).await;
            f.manager.add(&friend).await.unwrap();
        }
        let eve = befriend(&f, "eve", "Eve").await;

        let err = f.manager.add(&eve).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("limit"));

        let ids: Vec<_> = f
            .manager
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.friend_user_id)
            .collect();
        assert_eq!(ids, vec!["bea", "cam", "dee"]);
    }

    #[tokio::test]
    async fn test_toggle_and_enabled_targets() {
        let f = fixture().await;
        let bea = befriend(&f, "bea", "Bea").await;
        let cam = befriend(&f, "cam", "Cam").await;
        let bea_contact = f.manager.add(&bea).await.unwrap();
        f.manager.add(&cam).await.unwrap();

        f.manager.toggle(&bea_contact.local_id, false).await.unwrap();
        let targets = f.manager.enabled_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].friend_user_id, "cam");

        let err = f.manager.toggle("missing", true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_stale_contact_stays_targeted() {
        let f = fixture().await;
        let bea = befriend(&f, "bea", "Bea").await;
        f.manager.add(&bea).await.unwrap();

        f.graph.remove_friend("alex", "bea").await.unwrap();

        let targets = f.manager.enabled_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_survives_mirror_failure() {
        let f = fixture().await;
        let bea = befriend(&f, "bea", "Bea").await;
        let contact = f.manager.add(&bea).await.unwrap();

        f.remote.close().await;
        let removed = f.manager.remove(&contact.local_id).await.unwrap();
        assert_eq!(removed.friend_user_id, "bea");
        assert!(f.manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_cache_picks_up_renames() {
        let f = fixture().await;
        let bea = befriend(&f, "bea", "Bea").await;
        f.manager.add(&bea).await.unwrap();

        let renamed = Profile {
            name: "Beatrice".to_string(),
            profile_image_url: Some("avatars/bea.png".to_string()),
            ..bea
        };
        profile::update_profile(f.remote.pool(), &renamed).await.unwrap();

        assert_eq!(f.manager.refresh_cache().await.unwrap(), 1);
        let contacts = f.manager.list().await.unwrap();
        assert_eq!(contacts[0].cached_display_name, "Beatrice");
        assert_eq!(contacts[0].cached_avatar_ref.as_deref(), Some("avatars/bea.png"));
        assert_eq!(f.manager.refresh_cache().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_contacts_are_scoped_per_user() {
        let f = fixture().await;
        let bea = befriend(&f, "bea", "Bea").await;
        f.manager.add(&bea).await.unwrap();

        f.identity
            .sign_in(AuthPrincipal {
                user_id: "cam".to_string(),
                display_name: Some("Cam".to_string()),
            })
            .await
            .unwrap();
        assert!(f.manager.list().await.unwrap().is_empty());
    }
}
