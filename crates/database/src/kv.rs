//! Namespaced key/value storage backing the on-device preference store.
//!
//! Each write replaces the whole value of one key atomically. There are no
//! multi-key transactions.

use sqlx::SqlitePool;

use crate::Result;

/// Create or replace a value.
pub async fn put(pool: &SqlitePool, namespace: &str, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO local_kv (namespace, key, value)
        VALUES (?, ?, ?)
        ON CONFLICT(namespace, key) DO UPDATE SET
            value = excluded.value,
            updated_at = datetime('now')
        "#,
    )
    .bind(namespace)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read a value, `None` if the key is absent.
pub async fn get(pool: &SqlitePool, namespace: &str, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        r#"
        SELECT value
        FROM local_kv
        WHERE namespace = ? AND key = ?
        "#,
    )
    .bind(namespace)
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(value)
}

/// Delete a key. Returns true if it existed.
pub async fn delete(pool: &SqlitePool, namespace: &str, key: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM local_kv
        WHERE namespace = ? AND key = ?
        "#,
    )
    .bind(namespace)
    .bind(key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete every key in a namespace. Returns the number of keys removed.
pub async fn clear_namespace(pool: &SqlitePool, namespace: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM local_kv
        WHERE namespace = ?
        "#,
    )
    .bind(namespace)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// List the keys of a namespace.
pub async fn keys(pool: &SqlitePool, namespace: &str) -> Result<Vec<String>> {
    let keys = sqlx::query_scalar::<_, String>(
        r#"
        SELECT key
        FROM local_kv
        WHERE namespace = ?
        ORDER BY key
        "#,
    )
    .bind(namespace)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = Database::in_memory().await.unwrap();
        put(db.pool(), "alex", "emergency_friends_alex", "[]").await.unwrap();
        put(db.pool(), "bea", "emergency_friends_bea", "[1]").await.unwrap();

        assert_eq!(
            get(db.pool(), "alex", "emergency_friends_alex").await.unwrap().as_deref(),
            Some("[]")
        );
        assert!(get(db.pool(), "alex", "emergency_friends_bea").await.unwrap().is_none());

        assert_eq!(clear_namespace(db.pool(), "alex").await.unwrap(), 1);
        assert!(keys(db.pool(), "alex").await.unwrap().is_empty());
        assert_eq!(keys(db.pool(), "bea").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = Database::in_memory().await.unwrap();
        put(db.pool(), "", "trial_used", "false").await.unwrap();
        put(db.pool(), "", "trial_used", "true").await.unwrap();

        assert_eq!(get(db.pool(), "", "trial_used").await.unwrap().as_deref(), Some("true"));
        assert!(delete(db.pool(), "", "trial_used").await.unwrap());
        assert!(!delete(db.pool(), "", "trial_used").await.unwrap());
    }
}
