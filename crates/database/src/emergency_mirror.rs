//! Server-side mirror of emergency contact designations.
//!
//! The device-local list is canonical; this table is written on a best-effort
//! basis and never read back for alert targeting.

use sqlx::SqlitePool;

use crate::models::EmergencyFriend;
use crate::Result;

/// Record that `user_id` designated `friend_id`. Idempotent.
pub async fn add(pool: &SqlitePool, user_id: &str, friend_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emergency_friends (user_id, friend_id)
        VALUES (?, ?)
        ON CONFLICT(user_id, friend_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(friend_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a designation. Returns true if one existed.
pub async fn remove(pool: &SqlitePool, user_id: &str, friend_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM emergency_friends
        WHERE user_id = ? AND friend_id = ?
        "#,
    )
    .bind(user_id)
    .bind(friend_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All mirrored designations for a user.
pub async fn list(pool: &SqlitePool, user_id: &str) -> Result<Vec<EmergencyFriend>> {
    let rows = sqlx::query_as::<_, EmergencyFriend>(
        r#"
        SELECT user_id, friend_id, created_at
        FROM emergency_friends
        WHERE user_id = ?
        ORDER BY created_at, friend_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
