//! Device registration, classified sends and the delivery audit log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use database::{notification_history, push_token, Database, NewNotification, NotificationRecord};
use rider_core::{with_deadline, DevicePlatform, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::error::PushError;
use crate::gateway::PushGateway;
use crate::types::{DeliveryLogEntry, PushMessage, SendOutcome};

/// The push-permission registration of this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub user_id: String,
    pub token: String,
}

/// Push dispatch for one device.
///
/// Holds the push-permission registration, one of the two pieces of
/// process-wide state in the core.
pub struct PushDispatch {
    db: Database,
    gateway: Arc<dyn PushGateway>,
    platform: Arc<dyn DevicePlatform>,
    config: PushConfig,
    remote_timeout: Duration,
    registration: RwLock<Option<Registration>>,
    audit_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PushDispatch {
    /// Create a dispatcher.
    pub fn new(
        db: Database,
        gateway: Arc<dyn PushGateway>,
        platform: Arc<dyn DevicePlatform>,
        config: PushConfig,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            platform,
            config,
            remote_timeout,
            registration: RwLock::new(None),
            audit_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Obtain this device's push token and store it for `user_id`.
    ///
    /// Returns `None` without error when the platform cannot issue a token.
    pub async fn register_device(&self, user_id: &str) -> Result<Option<String>> {
        let Some(token) = self.platform.request_push_token().await else {
            info!(user_id, "No push token available on this device");
            return Ok(None);
        };

        with_deadline(
            "push.register_device",
            self.remote_timeout,
            push_token::upsert_token(self.db.pool(), user_id, &token),
        )
        .await?;

        *self.registration.write().await = Some(Registration {
            user_id: user_id.to_string(),
            token: token.clone(),
        });
        info!(user_id, "Registered device for push");
        Ok(Some(token))
    }

    /// Current registration, if any.
    pub async fn registration(&self) -> Option<Registration> {
        self.registration.read().await.clone()
    }

    /// Drop the registration and delete the remote token of `user_id`.
    pub async fn unregister(&self, user_id: &str) -> Result<()> {
        {
            let mut registration = self.registration.write().await;
            if registration.as_ref().is_some_and(|r| r.user_id == user_id) {
                *registration = None;
            }
        }

        let removed = with_deadline(
            "push.unregister",
            self.remote_timeout,
            push_token::delete_token(self.db.pool(), user_id),
        )
        .await?;
        info!(user_id, removed, "Unregistered device");
        Ok(())
    }

    /// Submit one message to `recipient_user_id` and classify the result.
    ///
    /// Exactly one gateway attempt; retry policy belongs to the caller.
    pub async fn send(
        &self,
        recipient_user_id: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> SendOutcome {
        let lookup = with_deadline(
            "push.lookup_token",
            self.remote_timeout,
            push_token::get_token(self.db.pool(), recipient_user_id),
        )
        .await;

        let token = match lookup {
            Ok(Some(record)) => record.push_token,
            Ok(None) => {
                debug!(recipient = %recipient_user_id, "Recipient has no push token");
                return SendOutcome::NoToken;
            }
            Err(err) => {
                warn!(recipient = %recipient_user_id, error = %err, "Token lookup failed");
                return SendOutcome::GatewayError {
                    reason: format!("token lookup failed: {}", err),
                };
            }
        };

        let message = PushMessage::new(token, title, body, data.clone(), &self.config);
        let submitted = tokio::time::timeout(self.config.timeout, self.gateway.submit(&message))
            .await
            .unwrap_or(Err(PushError::Timeout));

        match submitted {
            Ok(receipt) => {
                debug!(recipient = %recipient_user_id, ticket = ?receipt.ticket_id, "Push accepted");
                SendOutcome::Sent {
                    ticket_id: receipt.ticket_id,
                }
            }
            Err(err) => {
                warn!(recipient = %recipient_user_id, error = %err, "Push submission failed");
                SendOutcome::GatewayError {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Append per-target delivery rows for one alert.
    ///
    /// The rows of one call land together or not at all. Appends for the
    /// same `alert_id` are serialized.
    pub async fn log_delivery(
        &self,
        alert_id: &str,
        sender_user_id: &str,
        entries: &[DeliveryLogEntry],
    ) -> Result<()> {
        let data: Vec<String> = entries.iter().map(|e| e.data.to_string()).collect();
        let rows: Vec<NewNotification<'_>> = entries
            .iter()
            .zip(&data)
            .map(|(entry, data)| NewNotification {
                alert_id: Some(alert_id),
                recipient_user_id: &entry.recipient_user_id,
                sender_user_id,
                notification_type: &entry.notification_type,
                title: &entry.title,
                body: &entry.body,
                data: data.as_str(),
                delivery_status: entry.status.as_str(),
            })
            .collect();

        let lock = self.alert_lock(alert_id).await;
        let guard = lock.lock().await;
        let outcome = with_deadline(
            "push.log_delivery",
            self.remote_timeout,
            notification_history::insert_batch(self.db.pool(), &rows),
        )
        .await;
        drop(guard);
        self.release_alert_lock(alert_id, lock).await;

        if outcome.is_ok() {
            debug!(alert_id, rows = rows.len(), "Delivery rows appended");
        }
        outcome
    }

    /// Audit rows of one alert.
    pub async fn delivery_log(&self, alert_id: &str) -> Result<Vec<NotificationRecord>> {
        with_deadline(
            "push.delivery_log",
            self.remote_timeout,
            notification_history::list_for_alert(self.db.pool(), alert_id),
        )
        .await
    }

    async fn alert_lock(&self, alert_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.audit_locks.lock().await;
        locks.entry(alert_id.to_string()).or_default().clone()
    }

    async fn release_alert_lock(&self, alert_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.audit_locks.lock().await;
        // Only the map and this caller hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(alert_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RecordingGateway;
    use crate::types::DeliveryStatus;
    use rider_core::{ErrorKind, HeadlessPlatform, RecordingPlatform};

    async fn dispatch_with(
        gateway: Arc<RecordingGateway>,
        platform: Arc<dyn DevicePlatform>,
    ) -> (Database, PushDispatch) {
        let db = Database::in_memory().await.unwrap();
        let dispatch = PushDispatch::new(
            db.clone(),
            gateway,
            platform,
            PushConfig::default(),
            Duration::from_secs(5),
        );
        (db, dispatch)
    }

    fn entry(recipient: &str, status: DeliveryStatus) -> DeliveryLogEntry {
        DeliveryLogEntry {
            recipient_user_id: recipient.to_string(),
            notification_type: "fall_detected".to_string(),
            title: "Fall Detection Alert".to_string(),
            body: "Alex may have fallen while riding. Tap to view location.".to_string(),
            data: serde_json::json!({ "kind": "fall_detected" }),
            status,
        }
    }

    #[tokio::test]
    async fn test_register_without_token() {
        let (_db, dispatch) =
            dispatch_with(Arc::new(RecordingGateway::new()), Arc::new(HeadlessPlatform)).await;

        assert!(dispatch.register_device("alex").await.unwrap().is_none());
        assert!(dispatch.registration().await.is_none());
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let platform = Arc::new(RecordingPlatform::new().with_token("ExponentPushToken[alex]"));
        let (db, dispatch) = dispatch_with(Arc::new(RecordingGateway::new()), platform).await;

        let token = dispatch.register_device("alex").await.unwrap();
        assert_eq!(token.as_deref(), Some("ExponentPushToken[alex]"));
        let stored = push_token::get_token(db.pool(), "alex").await.unwrap().unwrap();
        assert_eq!(stored.push_token, "ExponentPushToken[alex]");

        dispatch.unregister("alex").await.unwrap();
        assert!(dispatch.registration().await.is_none());
        assert!(push_token::get_token(db.pool(), "alex").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_classifies_outcomes() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail_token("tok-cam");
        let (db, dispatch) = dispatch_with(gateway.clone(), Arc::new(HeadlessPlatform)).await;
        push_token::upsert_token(db.pool(), "bea", "tok-bea").await.unwrap();
        push_token::upsert_token(db.pool(), "cam", "tok-cam").await.unwrap();

        let data = serde_json::json!({ "kind": "manual" });
        let sent = dispatch.send("bea", "Emergency Alert", "Alex: help", &data).await;
        assert_eq!(
            sent,
            SendOutcome::Sent {
                ticket_id: Some("ticket-tok-bea".to_string())
            }
        );

        let failed = dispatch.send("cam", "Emergency Alert", "Alex: help", &data).await;
        assert!(matches!(failed, SendOutcome::GatewayError { .. }));

        let missing = dispatch.send("dee", "Emergency Alert", "Alex: help", &data).await;
        assert_eq!(missing, SendOutcome::NoToken);

        // No token means no gateway attempt.
        assert_eq!(gateway.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_log_delivery_serializes_per_alert() {
        let (_db, dispatch) =
            dispatch_with(Arc::new(RecordingGateway::new()), Arc::new(HeadlessPlatform)).await;
        let dispatch = Arc::new(dispatch);

        let first = {
            let dispatch = dispatch.clone();
            tokio::spawn(async move {
                dispatch
                    .log_delivery(
                        "alert-1",
                        "alex",
                        &[entry("bea", DeliveryStatus::Sent), entry("cam", DeliveryStatus::Sent)],
                    )
                    .await
            })
        };
        let second = {
            let dispatch = dispatch.clone();
            tokio::spawn(async move {
                dispatch
                    .log_delivery(
                        "alert-1",
                        "alex",
                        &[
                            entry("dee", DeliveryStatus::NoToken),
                            entry("eve", DeliveryStatus::Failed),
                        ],
                    )
                    .await
            })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let rows = dispatch.delivery_log("alert-1").await.unwrap();
        let recipients: Vec<_> = rows.iter().map(|r| r.recipient_user_id.as_str()).collect();
        assert_eq!(rows.len(), 4);
        // Each batch lands contiguously.
        let bea = recipients.iter().position(|r| *r == "bea").unwrap();
        assert_eq!(recipients[bea + 1], "cam");
        let dee = recipients.iter().position(|r| *r == "dee").unwrap();
        assert_eq!(recipients[dee + 1], "eve");

        assert!(dispatch.audit_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_log_delivery_rolls_back_partial_batch() {
        let (db, dispatch) =
            dispatch_with(Arc::new(RecordingGateway::new()), Arc::new(HeadlessPlatform)).await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_cam BEFORE INSERT ON notification_history
            WHEN NEW.recipient_user_id = 'cam'
            BEGIN
                SELECT RAISE(ABORT, 'rejected');
            END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = dispatch
            .log_delivery(
                "alert-3",
                "alex",
                &[entry("bea", DeliveryStatus::Sent), entry("cam", DeliveryStatus::Sent)],
            )
            .await;
        assert!(result.is_err());
        assert!(dispatch.delivery_log("alert-3").await.unwrap().is_empty());
        assert!(dispatch.audit_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_log_delivery_after_close_fails() {
        let (db, dispatch) =
            dispatch_with(Arc::new(RecordingGateway::new()), Arc::new(HeadlessPlatform)).await;
        db.close().await;

        let err = dispatch
            .log_delivery("alert-2", "alex", &[entry("bea", DeliveryStatus::Sent)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
