//! Append-only notification audit log.

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::models::{NewNotification, NotificationRecord};
use crate::Result;

const HISTORY_COLUMNS: &str = "id, alert_id, recipient_user_id, sender_user_id, \
     notification_type, title, body, data, delivery_status, created_at";

/// Append one audit row.
pub async fn insert_notification<'e, E>(executor: E, entry: &NewNotification<'_>) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO notification_history
            (alert_id, recipient_user_id, sender_user_id, notification_type,
             title, body, data, delivery_status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.alert_id)
    .bind(entry.recipient_user_id)
    .bind(entry.sender_user_id)
    .bind(entry.notification_type)
    .bind(entry.title)
    .bind(entry.body)
    .bind(entry.data)
    .bind(entry.delivery_status)
    .execute(executor)
    .await?;

    Ok(())
}

/// Append several audit rows in one transaction. Either all rows land or none.
pub async fn insert_batch(pool: &SqlitePool, entries: &[NewNotification<'_>]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        insert_notification(&mut *tx, entry).await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Audit rows of one alert, in insertion order.
pub async fn list_for_alert(pool: &SqlitePool, alert_id: &str) -> Result<Vec<NotificationRecord>> {
    let query = format!(
        "SELECT {HISTORY_COLUMNS} FROM notification_history WHERE alert_id = ? ORDER BY id"
    );
    let rows = sqlx::query_as::<_, NotificationRecord>(&query)
        .bind(alert_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Most recent audit rows addressed to a recipient.
pub async fn list_for_recipient(
    pool: &SqlitePool,
    recipient_user_id: &str,
    limit: i64,
) -> Result<Vec<NotificationRecord>> {
    let query = format!(
        r#"
        SELECT {HISTORY_COLUMNS}
        FROM notification_history
        WHERE recipient_user_id = ?
        ORDER BY id DESC
        LIMIT ?
        "#
    );
    let rows = sqlx::query_as::<_, NotificationRecord>(&query)
        .bind(recipient_user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
