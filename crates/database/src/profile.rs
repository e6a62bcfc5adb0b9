//! Profile CRUD operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::Profile;

const PROFILE_COLUMNS: &str = "id, name, age, description, experience, is_pro_member, \
     pro_explicit, profile_image_url, created_at, updated_at";

/// Create a new profile.
pub async fn create_profile(pool: &SqlitePool, profile: &Profile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO profiles
            (id, name, name_folded, age, description, experience, is_pro_member,
             pro_explicit, profile_image_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&profile.id)
    .bind(&profile.name)
    .bind(fold(&profile.name))
    .bind(profile.age)
    .bind(&profile.description)
    .bind(profile.experience)
    .bind(profile.is_pro_member)
    .bind(profile.pro_explicit)
    .bind(&profile.profile_image_url)
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::on_insert(e, "Profile", profile.id.clone()))?;

    Ok(())
}

/// Get a profile by ID.
pub async fn get_profile(pool: &SqlitePool, id: &str) -> Result<Option<Profile>> {
    let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?");
    let profile = sqlx::query_as::<_, Profile>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(profile)
}

/// Get several profiles by ID, ordered by name. Unknown ids are skipped.
pub async fn get_profiles(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Profile>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let query = format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id IN ({placeholders}) ORDER BY name"
    );

    let mut q = sqlx::query_as::<_, Profile>(&query);
    for id in ids {
        q = q.bind(id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Case-insensitive substring search on profile names.
///
/// Matching runs against the stored Unicode-folded name, so accented and
/// non-Latin names fold the same way as ASCII ones. `exclude_id` is never
/// returned. `%`, `_` and `\` in `needle` match literally.
pub async fn search_profiles(
    pool: &SqlitePool,
    needle: &str,
    exclude_id: &str,
    limit: i64,
) -> Result<Vec<Profile>> {
    let pattern = format!("%{}%", escape_like(&fold(needle)));
    let query = format!(
        r#"
        SELECT {PROFILE_COLUMNS}
        FROM profiles
        WHERE name_folded LIKE ? ESCAPE '\' AND id != ?
        ORDER BY name
        LIMIT ?
        "#
    );

    let profiles = sqlx::query_as::<_, Profile>(&query)
        .bind(pattern)
        .bind(exclude_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(profiles)
}

/// Overwrite the mutable columns of a profile and stamp `updated_at`.
pub async fn update_profile(pool: &SqlitePool, profile: &Profile) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE profiles
        SET name = ?, name_folded = ?, age = ?, description = ?, experience = ?,
            is_pro_member = ?, pro_explicit = ?, profile_image_url = ?,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(&profile.name)
    .bind(fold(&profile.name))
    .bind(profile.age)
    .bind(&profile.description)
    .bind(profile.experience)
    .bind(profile.is_pro_member)
    .bind(profile.pro_explicit)
    .bind(&profile.profile_image_url)
    .bind(&profile.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Profile",
            id: profile.id.clone(),
        });
    }

    Ok(())
}

// SQLite's lower() and LIKE only fold ASCII.
fn fold(value: &str) -> String {
    value.to_lowercase()
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn seed(db: &Database, names: &[(&str, &str)]) {
        for (id, name) in names {
            create_profile(db.pool(), &Profile::new(*id, *name)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_duplicate_profile() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, &[("u1", "Alex")]).await;

        let result = create_profile(db.pool(), &Profile::new("u1", "Alex again")).await;
        assert!(matches!(result, Err(DatabaseError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_excludes_self() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, &[("u1", "Alexandra"), ("u2", "alex"), ("u3", "Bea")]).await;

        let found = search_profiles(db.pool(), "ALEX", "u1", 10).await.unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["u2"]);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, &[("u1", "Cam"), ("u2", "100% Dee")]).await;

        let found = search_profiles(db.pool(), "0%", "nobody", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "u2");
    }

    #[tokio::test]
    async fn test_search_folds_accented_names() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, &[("u1", "Ádám"), ("u2", "Émile"), ("u3", "Zoë")]).await;

        let upper = search_profiles(db.pool(), "ÁDÁ", "nobody", 10).await.unwrap();
        assert_eq!(upper.len(), 1);
        assert_eq!(upper[0].id, "u1");

        let lower = search_profiles(db.pool(), "émi", "nobody", 10).await.unwrap();
        assert_eq!(lower.len(), 1);
        assert_eq!(lower[0].id, "u2");

        // A rename refreshes the folded name.
        let renamed = Profile::new("u3", "Øyvind");
        update_profile(db.pool(), &renamed).await.unwrap();
        assert!(search_profiles(db.pool(), "zoë", "nobody", 10).await.unwrap().is_empty());
        let found = search_profiles(db.pool(), "øYV", "nobody", 10).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_pro_explicit_round_trips() {
        let db = Database::in_memory().await.unwrap();
        let granted = Profile {
            is_pro_member: true,
            pro_explicit: true,
            ..Profile::new("u1", "Cam")
        };
        create_profile(db.pool(), &granted).await.unwrap();

        let fetched = get_profile(db.pool(), "u1").await.unwrap().unwrap();
        assert!(fetched.pro_explicit);
        assert!(fetched.is_pro_member);
    }

    #[tokio::test]
    async fn test_get_profiles_skips_unknown() {
        let db = Database::in_memory().await.unwrap();
        seed(&db, &[("u1", "Cam"), ("u2", "Bea")]).await;

        let ids = vec!["u1".to_string(), "missing".to_string(), "u2".to_string()];
        let profiles = get_profiles(db.pool(), &ids).await.unwrap();
        let names: Vec<_> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bea", "Cam"]);
    }

    #[tokio::test]
    async fn test_update_missing_profile() {
        let db = Database::in_memory().await.unwrap();
        let result = update_profile(db.pool(), &Profile::new("ghost", "Ghost")).await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }
}
