mod records;
mod schema;
mod types;

pub use schema::Store;
pub use types::{RecordScope, StoreError};

/// Fixed logical names for the persisted records.
///
/// Dotted convention: `area.record`. Each key holds one JSON-shaped record;
/// the scope decides whether it survives a restart.
pub mod keys {
    /// Session-scoped visit ledger (purged on every store open).
    pub const SESSION_HISTORY: &str = "session.history";
    /// Durable guest preference record.
    pub const GUEST_PREFERENCES: &str = "guest.preferences";
    /// Durable screensaver configuration (timeout, rotation, enabled).
    pub const SCREENSAVER_SETTINGS: &str = "screensaver.settings";
    /// Durable screensaver activation counters.
    pub const SCREENSAVER_STATS: &str = "screensaver.stats";
}
