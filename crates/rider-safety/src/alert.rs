//! Fall alert engine: alert records and best-effort fan-out to emergency contacts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use push_dispatch::{DeliveryLogEntry, DeliveryStatus, PushDispatch, SendOutcome};
use rider_core::{
    CoreError, DevicePlatform, IdentityGateway, LocalNotification, LocalStore, Location,
    NotificationPriority, Result, StoreKey,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contacts::{EmergencyContact, EmergencyContactManager};
use crate::detector::FallSignal;
use crate::payload::AlertPayload;

/// Name used when the rider has no display name.
pub const PLACEHOLDER_RIDER_NAME: &str = "Someone";

/// Number of alert records kept in the rider's local history.
pub const ALERT_HISTORY_LIMIT: usize = 20;

const FALL_TITLE: &str = "Fall Detection Alert";
const MANUAL_TITLE: &str = "Emergency Alert";
const DEFAULT_MANUAL_MESSAGE: &str = "I need help!";

/// What caused an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    FallDetected,
    Manual,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FallDetected => "fall_detected",
            AlertKind::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fall_detected" => Some(AlertKind::FallDetected),
            "manual" => Some(AlertKind::Manual),
            _ => None,
        }
    }
}

/// Input to [`FallAlertEngine::trigger`].
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub kind: AlertKind,
    pub location: Location,
    /// Rider-supplied text, used by manual alerts.
    pub message: Option<String>,
}

impl AlertRequest {
    /// A sensor-derived fall alert.
    pub fn fall_detected(location: Location) -> Self {
        Self {
            kind: AlertKind::FallDetected,
            location,
            message: None,
        }
    }

    /// A rider-triggered alert with a message.
    pub fn manual(location: Location, message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Manual,
            location,
            message: Some(message.into()),
        }
    }
}

/// Delivery outcome for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub friend_user_id: String,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TargetOutcome {
    fn from_send(target: &EmergencyContact, outcome: SendOutcome) -> Self {
        let status = outcome.delivery_status();
        let detail = match outcome {
            SendOutcome::Sent { ticket_id } => ticket_id,
            SendOutcome::NoToken => None,
            SendOutcome::GatewayError { reason } => Some(reason),
        };
        Self {
            friend_user_id: target.friend_user_id.clone(),
            status,
            detail,
        }
    }
}

/// A committed alert. Outcomes line up index-for-index with targets.
///
/// The record enters the rider's history before any push is sent, with no
/// outcomes. Outcomes are filled in once when the fan-out finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: String,
    pub rider_user_id: String,
    pub rider_display_name: String,
    pub kind: AlertKind,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub targets: Vec<EmergencyContact>,
    pub delivery_outcomes: Vec<TargetOutcome>,
}

impl AlertRecord {
    /// Title shown to recipients.
    pub fn title(&self) -> &'static str {
        match self.kind {
            AlertKind::FallDetected => FALL_TITLE,
            AlertKind::Manual => MANUAL_TITLE,
        }
    }

    /// Body shown to recipients.
    pub fn body(&self) -> String {
        match self.kind {
            AlertKind::FallDetected => format!(
                "{} may have fallen while riding. Tap to view location.",
                self.rider_display_name
            ),
            AlertKind::Manual => format!(
                "{}: {}",
                self.rider_display_name,
                self.message.as_deref().unwrap_or(DEFAULT_MANUAL_MESSAGE)
            ),
        }
    }

    /// Targets whose push was accepted by the gateway.
    pub fn notified_count(&self) -> usize {
        self.delivery_outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Sent)
            .count()
    }
}

/// Result returned to the caller of [`FallAlertEngine::trigger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub alert_id: String,
    pub notified_count: usize,
    pub total: usize,
}

/// Turns fall signals and manual triggers into alerts.
#[derive(Clone)]
pub struct FallAlertEngine {
    identity: Arc<IdentityGateway>,
    contacts: Arc<EmergencyContactManager>,
    dispatch: Arc<PushDispatch>,
    platform: Arc<dyn DevicePlatform>,
    store: LocalStore,
    location_timeout: Duration,
    history_lock: Arc<Mutex<()>>,
}

impl FallAlertEngine {
    pub fn new(
        identity: Arc<IdentityGateway>,
        contacts: Arc<EmergencyContactManager>,
        dispatch: Arc<PushDispatch>,
        platform: Arc<dyn DevicePlatform>,
        store: LocalStore,
        location_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            contacts,
            dispatch,
            platform,
            store,
            location_timeout,
            history_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current position from the device, or unknown on failure or deadline.
    pub async fn locate(&self) -> Location {
        match tokio::time::timeout(self.location_timeout, self.platform.current_location()).await {
            Ok(Some(coordinates)) => Location::Known(coordinates),
            Ok(None) => {
                debug!("Geolocation unavailable");
                Location::Unknown
            }
            Err(_) => {
                warn!(timeout = ?self.location_timeout, "Geolocation timed out");
                Location::Unknown
            }
        }
    }

    /// Locate the rider and raise a fall alert for `signal`.
    pub async fn report_fall(&self, signal: &FallSignal) -> Result<AlertSummary> {
        info!(at = ?signal.at, impact_g = signal.impact_g, "Reporting detected fall");
        let location = self.locate().await;
        self.trigger(AlertRequest::fall_detected(location)).await
    }

    /// Emit an alert to every enabled emergency contact.
    ///
    /// Once the record is created the fan-out runs to completion even if the
    /// returned future is dropped.
    pub async fn trigger(&self, request: AlertRequest) -> Result<AlertSummary> {
        let rider = self.identity.require_user().await?;
        let rider_name = match rider.name.trim() {
            "" => PLACEHOLDER_RIDER_NAME.to_string(),
            name => name.to_string(),
        };

        let targets = self.contacts.enabled_targets().await?;
        if targets.is_empty() {
            warn!(user_id = %rider.id, "Alert requested with no enabled emergency contacts");
            self.notify_rider(LocalNotification {
                title: "No Emergency Contacts".to_string(),
                body: "No one was notified. Add emergency contacts in Settings.".to_string(),
                priority: NotificationPriority::High,
                data: serde_json::json!({ "type": "no_targets", "kind": request.kind.as_str() }),
            })
            .await;
            return Err(CoreError::NoTargets);
        }

        let message = match request.kind {
            AlertKind::Manual => Some(
                request
                    .message
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_MANUAL_MESSAGE.to_string()),
            ),
            AlertKind::FallDetected => None,
        };

        let record = AlertRecord {
            alert_id: Uuid::new_v4().to_string(),
            rider_user_id: rider.id.clone(),
            rider_display_name: rider_name,
            kind: request.kind,
            location: request.location,
            message,
            timestamp: Utc::now(),
            targets,
            delivery_outcomes: Vec::new(),
        };
        info!(
            alert_id = %record.alert_id,
            user_id = %record.rider_user_id,
            kind = record.kind.as_str(),
            targets = record.targets.len(),
            "Alert committed"
        );

        let alert_id = record.alert_id.clone();
        let engine = self.clone();
        let record = tokio::spawn(async move { engine.fan_out(record).await })
            .await
            .map_err(|err| {
                error!(alert_id = %alert_id, error = %err, "Alert fan-out task failed");
                CoreError::Gateway(format!("alert {} fan-out aborted", alert_id))
            })?;

        Ok(AlertSummary {
            notified_count: record.notified_count(),
            total: record.targets.len(),
            alert_id: record.alert_id,
        })
    }

    /// Recent alerts of the signed-in rider, newest first.
    pub async fn history(&self) -> Result<Vec<AlertRecord>> {
        let rider = self.identity.require_user().await?;
        Ok(self
            .store
            .get(&StoreKey::AlertHistory(rider.id))
            .await?
            .unwrap_or_default())
    }

    async fn fan_out(self, mut record: AlertRecord) -> AlertRecord {
        let title = record.title();
        let body = record.body();
        let data = AlertPayload::encode(&record);

        self.remember(&record).await;
        self.notify_rider(LocalNotification {
            title: title.to_string(),
            body: body.clone(),
            priority: NotificationPriority::Max,
            data: data.clone(),
        })
        .await;

        let sends = record
            .targets
            .iter()
            .map(|target| self.dispatch.send(&target.friend_user_id, title, &body, &data));
        let outcomes = join_all(sends).await;

        record.delivery_outcomes = record
            .targets
            .iter()
            .zip(outcomes)
            .map(|(target, outcome)| TargetOutcome::from_send(target, outcome))
            .collect();

        let entries: Vec<DeliveryLogEntry> = record
            .delivery_outcomes
            .iter()
            .map(|outcome| DeliveryLogEntry {
                recipient_user_id: outcome.friend_user_id.clone(),
                notification_type: record.kind.as_str().to_string(),
                title: title.to_string(),
                body: body.clone(),
                data: data.clone(),
                status: outcome.status,
            })
            .collect();
        if let Err(err) = self
            .dispatch
            .log_delivery(&record.alert_id, &record.rider_user_id, &entries)
            .await
        {
            warn!(alert_id = %record.alert_id, error = %err, "Audit log write failed");
        }

        self.remember(&record).await;

        info!(
            alert_id = %record.alert_id,
            notified = record.notified_count(),
            total = record.targets.len(),
            "Alert fan-out complete"
        );
        record
    }

    async fn notify_rider(&self, notification: LocalNotification) {
        if let Err(err) = self.platform.show_local_notification(notification).await {
            warn!(error = %err, "Local notification failed");
        }
    }

    /// Insert `record` at the head of the history, or replace the entry
    /// with the same alert id.
    async fn remember(&self, record: &AlertRecord) {
        let key = StoreKey::AlertHistory(record.rider_user_id.clone());
        let _guard = self.history_lock.lock().await;
        let result = async {
            let mut history: Vec<AlertRecord> = self.store.get(&key).await?.unwrap_or_default();
            match history.iter_mut().find(|r| r.alert_id == record.alert_id) {
                Some(existing) => *existing = record.clone(),
                None => {
                    history.insert(0, record.clone());
                    history.truncate(ALERT_HISTORY_LIMIT);
                }
            }
            self.store.put(&key, &history).await
        }
        .await;

        if let Err(err) = result {
            warn!(alert_id = %record.alert_id, error = %err, "Alert history write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::{friendship, profile, push_token, Database, FriendStatus, Profile};
    use async_trait::async_trait;
    use push_dispatch::{
        GatewayReceipt, PushConfig, PushError, PushGateway, PushMessage, RecordingGateway,
    };
    use rider_core::{AuthPrincipal, Coordinates, ErrorKind, RecordingPlatform};
    use social_graph::{GraphTimeouts, SocialGraph};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        remote: Database,
        local: LocalStore,
        identity: Arc<IdentityGateway>,
        platform: Arc<RecordingPlatform>,
        gateway: Arc<RecordingGateway>,
        contacts: Arc<EmergencyContactManager>,
        dispatch: Arc<PushDispatch>,
        engine: FallAlertEngine,
    }

    async fn fixture(rider_name: &str) -> Fixture {
        let remote = Database::in_memory().await.unwrap();
        let local = LocalStore::new(Database::in_memory().await.unwrap(), TIMEOUT);
        let platform = Arc::new(RecordingPlatform::new());
        let gateway = Arc::new(RecordingGateway::new());

        let identity = Arc::new(IdentityGateway::new(remote.clone(), TIMEOUT));
        let graph = Arc::new(SocialGraph::new(
            remote.clone(),
            identity.clone(),
            GraphTimeouts {
                remote: TIMEOUT,
                search: TIMEOUT,
            },
        ));
        let contacts = Arc::new(EmergencyContactManager::new(
            identity.clone(),
            graph,
            local.clone(),
            remote.clone(),
            TIMEOUT,
        ));
        let dispatch = Arc::new(PushDispatch::new(
            remote.clone(),
            gateway.clone(),
            platform.clone(),
            PushConfig::default(),
            TIMEOUT,
        ));
        let engine = FallAlertEngine::new(
            identity.clone(),
            contacts.clone(),
            dispatch.clone(),
            platform.clone(),
            local.clone(),
            TIMEOUT,
        );

        profile::create_profile(remote.pool(), &Profile::new("alex", rider_name))
            .await
            .unwrap();
        identity
            .sign_in(AuthPrincipal {
                user_id: "alex".to_string(),
                display_name: None,
            })
            .await
            .unwrap();

        Fixture {
            remote,
            local,
            identity,
            platform,
            gateway,
            contacts,
            dispatch,
            engine,
        }
    }

    async fn add_contact(f: &Fixture, id: &str, name: &str, token: Option<&str>) -> EmergencyContact {
        let friend = Profile::new(id, name);
        profile::create_profile(f.remote.pool(), &friend).await.unwrap();
        friendship::insert_edge(f.remote.pool(), id, "alex", FriendStatus::Accepted)
            .await
            .unwrap();
        if let Some(token) = token {
            push_token::upsert_token(f.remote.pool(), id, token).await.unwrap();
        }
        f.contacts.add(&friend).await.unwrap()
    }

    #[test]
    fn test_titles_and_bodies() {
        let record = AlertRecord {
            alert_id: "a".to_string(),
            rider_user_id: "alex".to_string(),
            rider_display_name: "Alex".to_string(),
            kind: AlertKind::Manual,
            location: Location::Unknown,
            message: Some("lost a stirrup".to_string()),
            timestamp: Utc::now(),
            targets: Vec::new(),
            delivery_outcomes: Vec::new(),
        };
        assert_eq!(record.title(), "Emergency Alert");
        assert_eq!(record.body(), "Alex: lost a stirrup");

        let fall = AlertRecord {
            kind: AlertKind::FallDetected,
            message: None,
            ..record
        };
        assert_eq!(fall.title(), "Fall Detection Alert");
        assert_eq!(
            fall.body(),
            "Alex may have fallen while riding. Tap to view location."
        );
    }

    #[tokio::test]
    async fn test_mixed_outcomes_are_recorded() {
        let f = fixture("Alex").await;
        add_contact(&f, "bea", "Bea", Some("tok-bea")).await;
        add_contact(&f, "cam", "Cam", None).await;
        add_contact(&f, "dee", "Dee", Some("tok-dee")).await;
        f.gateway.fail_token("tok-dee");

        let seattle = Coordinates::new(47.6062, -122.3321).unwrap();
        let summary = f
            .engine
            .trigger(AlertRequest::fall_detected(Location::Known(seattle)))
            .await
            .unwrap();
        assert_eq!(summary.notified_count, 1);
        assert_eq!(summary.total, 3);

        let history = f.engine.history().await.unwrap();
        let record = &history[0];
        assert_eq!(record.alert_id, summary.alert_id);
        let statuses: Vec<_> = record.delivery_outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![DeliveryStatus::Sent, DeliveryStatus::NoToken, DeliveryStatus::Failed]
        );

        let rows = f.dispatch.delivery_log(&summary.alert_id).await.unwrap();
        assert_eq!(rows.len(), 3);

        let shown = f.platform.notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].priority, NotificationPriority::Max);
        assert_eq!(shown[0].data["latitude"], 47.6062);
    }

    #[tokio::test]
    async fn test_no_targets_notifies_rider_only() {
        let f = fixture("Alex").await;
        let bea = add_contact(&f, "bea", "Bea", Some("tok-bea")).await;
        f.contacts.toggle(&bea.local_id, false).await.unwrap();

        let err = f
            .engine
            .trigger(AlertRequest::manual(Location::Unknown, "help"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoTargets);

        assert!(f.engine.history().await.unwrap().is_empty());
        assert!(f.gateway.submitted().is_empty());
        assert_eq!(f.platform.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_name_and_unknown_location() {
        let f = fixture("").await;
        add_contact(&f, "bea", "Bea", Some("tok-bea")).await;

        let summary = f
            .engine
            .trigger(AlertRequest::manual(Location::Unknown, "  "))
            .await
            .unwrap();
        assert_eq!(summary.notified_count, 1);

        let sent = f.gateway.submitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Someone: I need help!");
        assert_eq!(sent[0].data["latitude"], 0.0);
        assert_eq!(sent[0].data["longitude"], 0.0);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_alert() {
        let f = fixture("Alex").await;
        add_contact(&f, "bea", "Bea", Some("tok-bea")).await;
        // Token lookups and the audit log share the remote store.
        f.remote.close().await;

        let summary = f
            .engine
            .trigger(AlertRequest::fall_detected(Location::Unknown))
            .await
            .unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.notified_count, 0);
        assert_eq!(f.engine.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let f = fixture("Alex").await;
        add_contact(&f, "bea", "Bea", Some("tok-bea")).await;

        let mut last = String::new();
        for _ in 0..(ALERT_HISTORY_LIMIT + 2) {
            last = f
                .engine
                .trigger(AlertRequest::fall_detected(Location::Unknown))
                .await
                .unwrap()
                .alert_id;
        }

        let history = f.engine.history().await.unwrap();
        assert_eq!(history.len(), ALERT_HISTORY_LIMIT);
        assert_eq!(history[0].alert_id, last);
    }

    /// Records how many outcomes the newest history entry holds at send time.
    struct HistoryPeekGateway {
        store: LocalStore,
        seen: std::sync::Mutex<Vec<Option<usize>>>,
    }

    #[async_trait]
    impl PushGateway for HistoryPeekGateway {
        async fn submit(&self, _message: &PushMessage) -> std::result::Result<GatewayReceipt, PushError> {
            let history: Vec<AlertRecord> = self
                .store
                .get(&StoreKey::AlertHistory("alex".to_string()))
                .await
                .unwrap()
                .unwrap_or_default();
            self.seen
                .lock()
                .unwrap()
                .push(history.first().map(|r| r.delivery_outcomes.len()));
            Ok(GatewayReceipt::default())
        }
    }

    #[tokio::test]
    async fn test_record_is_stored_before_sends() {
        let f = fixture("Alex").await;
        add_contact(&f, "bea", "Bea", Some("tok-bea")).await;

        let gateway = Arc::new(HistoryPeekGateway {
            store: f.local.clone(),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let dispatch = Arc::new(PushDispatch::new(
            f.remote.clone(),
            gateway.clone(),
            f.platform.clone(),
            PushConfig::default(),
            TIMEOUT,
        ));
        let engine = FallAlertEngine::new(
            f.identity.clone(),
            f.contacts.clone(),
            dispatch,
            f.platform.clone(),
            f.local.clone(),
            TIMEOUT,
        );

        let summary = engine
            .trigger(AlertRequest::fall_detected(Location::Unknown))
            .await
            .unwrap();
        assert_eq!(*gateway.seen.lock().unwrap(), vec![Some(0)]);

        // The committed entry is updated in place, not duplicated.
        let history = engine.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].alert_id, summary.alert_id);
        assert_eq!(history[0].delivery_outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_locate_falls_back_to_unknown() {
        let f = fixture("Alex").await;
        assert_eq!(f.engine.locate().await, Location::Unknown);

        let seattle = Coordinates::new(47.6062, -122.3321).unwrap();
        f.platform.set_location(Some(seattle));
        assert_eq!(f.engine.locate().await, Location::Known(seattle));
    }

    #[tokio::test]
    async fn test_trigger_requires_sign_in() {
        let remote = Database::in_memory().await.unwrap();
        let f = fixture("Alex").await;
        let signed_out = IdentityGateway::new(remote, TIMEOUT);
        let engine = FallAlertEngine {
            identity: Arc::new(signed_out),
            ..f.engine.clone()
        };

        let err = engine
            .trigger(AlertRequest::fall_detected(Location::Unknown))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }
}
