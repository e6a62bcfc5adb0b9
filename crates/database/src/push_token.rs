//! Push token storage. Last write wins per user.

use sqlx::SqlitePool;

use crate::models::PushToken;
use crate::Result;

/// Create or replace the push token for a user.
pub async fn upsert_token(pool: &SqlitePool, user_id: &str, token: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_push_tokens (user_id, push_token)
        VALUES (?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            push_token = excluded.push_token,
            updated_at = datetime('now')
        "#,
    )
    .bind(user_id)
    .bind(token)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the push token for a user.
pub async fn get_token(pool: &SqlitePool, user_id: &str) -> Result<Option<PushToken>> {
    let record = sqlx::query_as::<_, PushToken>(
        r#"
        SELECT user_id, push_token, updated_at
        FROM user_push_tokens
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Remove the push token for a user. Returns true if one existed.
pub async fn delete_token(pool: &SqlitePool, user_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_push_tokens
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
