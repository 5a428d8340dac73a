use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use super::schema::Store;
use super::types::{RecordScope, StoreError};

impl Store {
    // ========================================================================
    // Record Operations
    // ========================================================================

    /// Load a JSON record by its logical key.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the key does not exist, or when the stored value is
    /// malformed JSON, in which case the bad row is logged, deleted, and
    /// treated as absent. Callers fall back to their documented defaults
    /// either way; a corrupt record is never fatal.
    pub async fn load_record<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some((value,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(&value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding malformed persisted record");
                sqlx::query("DELETE FROM records WHERE key = ?")
                    .bind(key)
                    .execute(&self.pool)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Serialize and upsert a record, then publish a change notification.
    ///
    /// The full record is rewritten on every save: records are small and
    /// bounded, so there is no incremental diffing.
    pub async fn save_record<T: Serialize>(
        &self,
        key: &str,
        scope: RecordScope,
        record: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO records (key, scope, value, updated_at)
            VALUES (?, ?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE
                SET scope = excluded.scope,
                    value = excluded.value,
                    updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(scope.as_str())
        .bind(&value)
        .execute(&self.pool)
        .await?;

        self.notify(key);
        Ok(())
    }

    /// Remove a record entirely. Loading the key afterwards yields `None`.
    pub async fn delete_record(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        self.notify(key);
        Ok(())
    }

    /// Subscribe to record-change notifications.
    ///
    /// Receivers get the logical key of each record that was saved or
    /// deleted after the subscription was created. Delivery is best-effort:
    /// a lagging receiver may miss intermediate notifications, which is
    /// acceptable because consumers re-read the record, not the message.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    fn notify(&self, key: &str) {
        // send() errs only when no receiver exists, which is the normal state
        // before any surface subscribes
        let _ = self.changes.send(key.to_string());
    }
}
