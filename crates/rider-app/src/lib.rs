//! Composition root of the rider-safety core.
//!
//! [`RiderCore`] wires identity, the local store, the social graph, push
//! dispatch, emergency contacts, the fall alert engine and the tutorial
//! engine together, and owns the sign-in/sign-out lifecycle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rider_app::RiderCore;
//! use rider_core::{AuthPrincipal, HeadlessPlatform, Location};
//! use rider_safety::AlertRequest;
//! use tutorial::Catalog;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let core = RiderCore::from_env(Arc::new(HeadlessPlatform), Catalog::default()).await?;
//! let rider = core
//!     .sign_in(AuthPrincipal {
//!         user_id: "alex".to_string(),
//!         display_name: Some("Alex".to_string()),
//!     })
//!     .await?;
//!
//! let summary = core
//!     .alerts()
//!     .trigger(AlertRequest::manual(Location::Unknown, "Horse spooked, I'm down"))
//!     .await?;
//! println!("{} notified {}/{}", rider.name, summary.notified_count, summary.total);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use database::{Database, DatabaseError};
use push_dispatch::{HttpPushGateway, PushConfig, PushDispatch, PushError, PushGateway};
use rider_core::{
    AuthPrincipal, ConfigError, CoreConfig, CoreError, DevicePlatform, IdentityGateway,
    LocalStore, User,
};
use rider_safety::{EmergencyContactManager, FallAlertEngine};
use social_graph::{GraphTimeouts, SocialGraph};
use thiserror::Error;
use tracing::{info, warn};
use tutorial::{Catalog, TutorialEngine};

/// Errors raised while assembling the core.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("push configuration error: {0}")]
    Push(#[from] PushError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Every component of the rider-safety core, wired together.
pub struct RiderCore {
    config: CoreConfig,
    identity: Arc<IdentityGateway>,
    store: LocalStore,
    graph: Arc<SocialGraph>,
    dispatch: Arc<PushDispatch>,
    contacts: Arc<EmergencyContactManager>,
    alerts: FallAlertEngine,
    tutorials: TutorialEngine,
}

impl RiderCore {
    /// Connect using [`CoreConfig::from_env`] and [`PushConfig::from_env`],
    /// submitting pushes over HTTP.
    pub async fn from_env(platform: Arc<dyn DevicePlatform>, catalog: Catalog) -> Result<Self, AppError> {
        let config = CoreConfig::from_env()?;
        let push = PushConfig::from_env()?;
        let gateway = Arc::new(HttpPushGateway::new(push.clone())?);
        Self::connect(config, push, gateway, platform, catalog).await
    }

    /// Open and migrate both stores, then assemble.
    pub async fn connect(
        config: CoreConfig,
        push: PushConfig,
        gateway: Arc<dyn PushGateway>,
        platform: Arc<dyn DevicePlatform>,
        catalog: Catalog,
    ) -> Result<Self, AppError> {
        let remote = Database::connect(&config.database_url).await?;
        remote.migrate().await?;
        let local = Database::connect(&config.local_store_url).await?;
        local.migrate().await?;

        Ok(Self::assemble(config, remote, local, push, gateway, platform, catalog))
    }

    /// Wire components over already-open stores.
    pub fn assemble(
        config: CoreConfig,
        remote: Database,
        local: Database,
        push: PushConfig,
        gateway: Arc<dyn PushGateway>,
        platform: Arc<dyn DevicePlatform>,
        catalog: Catalog,
    ) -> Self {
        let identity = Arc::new(IdentityGateway::new(remote.clone(), config.remote_timeout));
        let store = LocalStore::new(local, config.local_timeout);
        let graph = Arc::new(SocialGraph::new(
            remote.clone(),
            identity.clone(),
            GraphTimeouts {
                remote: config.remote_timeout,
                search: config.search_timeout,
            },
        ));
        let dispatch = Arc::new(PushDispatch::new(
            remote.clone(),
            gateway,
            platform.clone(),
            push,
            config.remote_timeout,
        ));
        let contacts = Arc::new(EmergencyContactManager::new(
            identity.clone(),
            graph.clone(),
            store.clone(),
            remote,
            config.remote_timeout,
        ));
        let alerts = FallAlertEngine::new(
            identity.clone(),
            contacts.clone(),
            dispatch.clone(),
            platform,
            store.clone(),
            config.location_timeout,
        );
        let tutorials = TutorialEngine::new(identity.clone(), store.clone(), Arc::new(catalog));

        Self {
            config,
            identity,
            store,
            graph,
            dispatch,
            contacts,
            alerts,
            tutorials,
        }
    }

    /// Record an authentication and register this device for push.
    ///
    /// A failed push registration is logged; the user stays signed in.
    pub async fn sign_in(&self, principal: AuthPrincipal) -> Result<User, CoreError> {
        // A different account on this device must not inherit the previous
        // user's push token or cached state.
        if let Some(current) = self.identity.current_user().await {
            if current.id != principal.user_id {
                info!(previous = %current.id, next = %principal.user_id, "Switching user");
                self.sign_out().await?;
            }
        }

        let user = self.identity.sign_in(principal).await?;
        match self.dispatch.register_device(&user.id).await {
            Ok(Some(_)) => {}
            Ok(None) => info!(user_id = %user.id, "Signed in without push"),
            Err(err) => warn!(user_id = %user.id, error = %err, "Push registration failed"),
        }
        Ok(user)
    }

    /// Sign out: drop the user cache and push registration, delete the
    /// remote push token and clear the user's local keys.
    ///
    /// Returns the id of the user that was signed in.
    pub async fn sign_out(&self) -> Result<Option<String>, CoreError> {
        let Some(user) = self.identity.sign_out().await else {
            return Ok(None);
        };

        if let Err(err) = self.dispatch.unregister(&user.id).await {
            warn!(user_id = %user.id, error = %err, "Failed to delete remote push token");
        }
        let cleared = self.store.clear_user(&user.id).await?;
        info!(user_id = %user.id, cleared, "Signed out and cleared local state");
        Ok(Some(user.id))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityGateway {
        &self.identity
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn graph(&self) -> &SocialGraph {
        &self.graph
    }

    pub fn dispatch(&self) -> &PushDispatch {
        &self.dispatch
    }

    pub fn contacts(&self) -> &EmergencyContactManager {
        &self.contacts
    }

    pub fn alerts(&self) -> &FallAlertEngine {
        &self.alerts
    }

    pub fn tutorials(&self) -> &TutorialEngine {
        &self.tutorials
    }
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
