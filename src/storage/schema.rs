use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Local Store
// ============================================================================

/// Durable key-value store backing saved articles, the feed cache and the
/// daily download counters.
///
/// Cloning is cheap (the pool is reference counted). There is no locking
/// above SQLite itself: two concurrent read-modify-write cycles on the same
/// key resolve last-write-wins.
#[derive(Clone)]
pub struct LocalStore {
    pub(crate) pool: SqlitePool,
}

impl LocalStore {
    /// Open (or create) the store at `path` and run migrations.
    ///
    /// Pass `":memory:"` for a throwaway store.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Restrict a freshly created store file to the current user.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // SQLite reports the real error at connect time.
            }
        }

        // busy_timeout lets a background sweep and an interactive refresh wait
        // on each other instead of failing with SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::debug!(path = %path, "Local store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Close the underlying pool. Later operations fail and fall back to
    /// their safe defaults.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
