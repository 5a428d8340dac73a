use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;

use super::types::StoreError;

/// Capacity of the change-notification channel. Notifications are
/// coalescable hints ("re-read this key"), so lagging receivers that drop a
/// few messages simply re-read slightly later.
const CHANGE_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Store
// ============================================================================

/// SQLite-backed record store holding the engine's persisted state.
///
/// One table of JSON records keyed by logical name, each tagged with a
/// lifetime scope. Opening the store starts a new session: all session-scoped
/// rows are purged, mirroring tab-scoped browser storage.
///
/// Every successful write publishes the record key on a broadcast channel so
/// other surfaces in the process can re-read configuration live (the
/// storage-change notification). Delivery is eventually consistent.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) changes: broadcast::Sender<String>,
}

impl Store {
    /// Open the store, run migrations, and purge session-scoped records.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InstanceLocked` if another kiosk process has the
    /// store locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `StoreError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Restrict store file access to the kiosk user. Pre-creating with
        // mode 0600 sets permissions at creation time, so there is no window
        // where the file exists with default umask permissions.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set store file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite reports the error at connect_with.
                }
            }
        }

        // busy_timeout=5000: wait up to 5s for locks before SQLITE_BUSY, which
        // absorbs transient contention from concurrent record writes.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; the engine's writers are a handful of
        // fire-and-forget persistence calls, so a small pool suffices.
        let pool = SqlitePoolOptions::new()
            .max_connections(3)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = Self { pool, changes };

        store.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                StoreError::InstanceLocked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;

        store.begin_session().await?;
        Ok(store)
    }

    /// Run store migrations atomically within a transaction.
    ///
    /// All schema changes use `IF NOT EXISTS` for idempotency, so re-running
    /// on an existing store is a no-op. If any step fails the transaction is
    /// rolled back, leaving the store in its previous consistent state.
    async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                scope TEXT NOT NULL CHECK(scope IN ('session', 'durable')),
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Drop all session-scoped records. A new process is a new session.
    async fn begin_session(&self) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE scope = 'session'")
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(
                purged = result.rows_affected(),
                "Purged session records from previous run"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = Store::open(":memory:").await.unwrap();
        // Re-running migrations on a live store must be a no-op
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_purges_session_rows() {
        let store = Store::open(":memory:").await.unwrap();

        sqlx::query(
            "INSERT INTO records (key, scope, value, updated_at)
             VALUES ('session.history', 'session', '[]', datetime('now')),
                    ('guest.preferences', 'durable', '{}', datetime('now'))",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        store.begin_session().await.unwrap();

        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM records ORDER BY key")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "guest.preferences");
    }
}
