use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Executor, Sqlite};

use super::schema::LocalStore;
use super::types::StoreError;

impl LocalStore {
    // ========================================================================
    // Raw Key-Value Operations
    // ========================================================================

    /// Raw serialized value stored under `key`, if any.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        read_value(&self.pool, key).await
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub async fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        write_value(&self.pool, key, value).await
    }

    /// Delete `key`. Deleting a missing key is not an error.
    pub async fn remove_raw(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub(crate) async fn read_value<'e, E>(executor: E, key: &str) -> Result<Option<String>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|(value,)| value))
}

pub(crate) async fn write_value<'e, E>(executor: E, key: &str, value: &str) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
    "#,
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}

/// Decode the JSON value under `key`. A missing key decodes as `None`.
pub(crate) async fn read_json<'e, E, T>(executor: E, key: &str) -> Result<Option<T>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
    T: DeserializeOwned,
{
    match read_value(executor, key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub(crate) async fn write_json<'e, E, T>(executor: E, key: &str, value: &T) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    write_value(executor, key, &raw).await
}

#[cfg(test)]
mod tests {
    use crate::storage::LocalStore;

    async fn test_store() -> LocalStore {
        LocalStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_raw_missing() {
        let store = test_store().await;
        assert_eq!(store.get_raw("@nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_raw_upsert() {
        let store = test_store().await;
        store.set_raw("@key", "1").await.unwrap();
        store.set_raw("@key", "2").await.unwrap();
        assert_eq!(store.get_raw("@key").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_remove_raw() {
        let store = test_store().await;
        store.set_raw("@key", "1").await.unwrap();
        store.remove_raw("@key").await.unwrap();
        store.remove_raw("@key").await.unwrap();
        assert_eq!(store.get_raw("@key").await.unwrap(), None);
    }
}
