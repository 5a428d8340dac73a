use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another instance of the kiosk has locked the store
    #[error("Another cabana instance appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Store migration failed: {0}")]
    Migration(String),

    /// A record could not be serialized for persistence
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Generic database error
    #[error("Store error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Other(err)
    }
}

// ============================================================================
// Record Scope
// ============================================================================

/// Lifetime class of a persisted record.
///
/// `Session` records model tab-scoped state: they live only as long as one
/// kiosk process and are purged the next time the store is opened. `Durable`
/// records survive restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    Session,
    Durable,
}

impl RecordScope {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            RecordScope::Session => "session",
            RecordScope::Durable => "durable",
        }
    }
}
