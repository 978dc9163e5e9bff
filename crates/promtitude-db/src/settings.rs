//! Key-value settings table.
//!
//! Values are stored as JSON. The typed helpers wrap serde for callers that
//! keep a struct under one key (the API session, for instance).

use crate::error::{DatabaseError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

/// Set a setting in the database
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &Value) -> Result<()> {
    let value_str = serde_json::to_string(value)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

    sqlx::query(
        r"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = datetime('now')
        ",
    )
    .bind(key)
    .bind(value_str)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a setting from the database
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<Value>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    row.map(|(value_str,)| {
        serde_json::from_str(&value_str)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))
    })
    .transpose()
}

/// Delete a setting from the database
pub async fn delete_setting(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}

/// Store any serializable value under `key`.
pub async fn put<T: Serialize>(pool: &SqlitePool, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    set_setting(pool, key, &value).await
}

/// Read the value under `key` back into `T`.
pub async fn fetch<T: DeserializeOwned>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    get_setting(pool, key)
        .await?
        .map(|value| {
            serde_json::from_value(value).map_err(|e| {
                DatabaseError::Serialization(format!("setting '{key}': {e}"))
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use serde::Deserialize;

    async fn create_test_db() -> Database {
        let db = Database::in_memory().await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        api_base_url: String,
        token: String,
    }

    #[tokio::test]
    async fn test_set_and_get_setting() {
        let db = create_test_db().await;

        let value = serde_json::json!({"headless": false});
        set_setting(db.pool(), "browser", &value).await.unwrap();
        assert_eq!(get_setting(db.pool(), "browser").await.unwrap(), Some(value));

        let replaced = serde_json::json!({"headless": true});
        set_setting(db.pool(), "browser", &replaced).await.unwrap();
        assert_eq!(
            get_setting(db.pool(), "browser").await.unwrap(),
            Some(replaced)
        );
    }

    #[tokio::test]
    async fn test_missing_and_deleted_setting() {
        let db = create_test_db().await;
        assert_eq!(get_setting(db.pool(), "does_not_exist").await.unwrap(), None);

        set_setting(db.pool(), "k", &serde_json::json!(1)).await.unwrap();
        delete_setting(db.pool(), "k").await.unwrap();
        assert_eq!(get_setting(db.pool(), "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let db = create_test_db().await;
        let session = Session {
            api_base_url: "https://api.example.test".to_string(),
            token: "t0k".to_string(),
        };

        put(db.pool(), "session", &session).await.unwrap();
        let loaded: Option<Session> = fetch(db.pool(), "session").await.unwrap();
        assert_eq!(loaded, Some(session));

        set_setting(db.pool(), "session", &serde_json::json!("not a session"))
            .await
            .unwrap();
        let err = fetch::<Session>(db.pool(), "session").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }
}
