//! Friendship row operations.
//!
//! Rows are directed (`user_id` requested, `friend_id` received). Callers that
//! need the logical relationship between two users must look at both
//! directions; see [`edges_between`] and [`accepted_edges_for`].

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{FriendStatus, Friendship};

const FRIENDSHIP_COLUMNS: &str = "id, user_id, friend_id, status, created_at, updated_at";

/// Insert a directed friendship row.
///
/// Fails with `AlreadyExists` if a row for the same direction exists.
pub async fn insert_edge(
    pool: &SqlitePool,
    user_id: &str,
    friend_id: &str,
    status: FriendStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO friendships (user_id, friend_id, status)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(friend_id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::on_insert(e, "Friendship", format!("{}->{}", user_id, friend_id)))?;

    Ok(())
}

/// All rows between two users, in either direction.
pub async fn edges_between(pool: &SqlitePool, a: &str, b: &str) -> Result<Vec<Friendship>> {
    let query = format!(
        r#"
        SELECT {FRIENDSHIP_COLUMNS}
        FROM friendships
        WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)
        ORDER BY id
        "#
    );

    let rows = sqlx::query_as::<_, Friendship>(&query)
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Accepted rows touching `user_id` on either side.
pub async fn accepted_edges_for(pool: &SqlitePool, user_id: &str) -> Result<Vec<Friendship>> {
    let query = format!(
        r#"
        SELECT {FRIENDSHIP_COLUMNS}
        FROM friendships
        WHERE (user_id = ? OR friend_id = ?) AND status = 'accepted'
        ORDER BY id
        "#
    );

    let rows = sqlx::query_as::<_, Friendship>(&query)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Pending rows received by `user_id`, oldest first.
pub async fn pending_incoming(pool: &SqlitePool, user_id: &str) -> Result<Vec<Friendship>> {
    let query = format!(
        r#"
        SELECT {FRIENDSHIP_COLUMNS}
        FROM friendships
        WHERE friend_id = ? AND status = 'pending'
        ORDER BY created_at, id
        "#
    );

    let rows = sqlx::query_as::<_, Friendship>(&query)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Move a directed row from `from` to `to` status.
///
/// Returns `NotFound` if no row in state `from` exists for that direction.
pub async fn transition(
    pool: &SqlitePool,
    user_id: &str,
    friend_id: &str,
    from: FriendStatus,
    to: FriendStatus,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE friendships
        SET status = ?, updated_at = datetime('now')
        WHERE user_id = ? AND friend_id = ? AND status = ?
        "#,
    )
    .bind(to.as_str())
    .bind(user_id)
    .bind(friend_id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Friendship",
            id: format!("{}->{} ({})", user_id, friend_id, from.as_str()),
        });
    }

    Ok(())
}

/// Set the status of a directed row regardless of its current status.
pub async fn set_status(
    pool: &SqlitePool,
    user_id: &str,
    friend_id: &str,
    status: FriendStatus,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE friendships
        SET status = ?, updated_at = datetime('now')
        WHERE user_id = ? AND friend_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(user_id)
    .bind(friend_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete one directed row. Returns the number of rows removed.
pub async fn delete_edge(pool: &SqlitePool, user_id: &str, friend_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM friendships
        WHERE user_id = ? AND friend_id = ?
        "#,
    )
    .bind(user_id)
    .bind(friend_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete both directions between two users. Returns the number of rows removed.
pub async fn delete_pair(pool: &SqlitePool, a: &str, b: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM friendships
        WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)
        "#,
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
