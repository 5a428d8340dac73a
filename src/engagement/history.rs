use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{keys, RecordScope, Store};

/// Maximum entries the session ledger holds. Inserting at capacity evicts the
/// oldest entry.
pub const MAX_HISTORY: usize = 50;

/// How many of the most recent entries are checked for duplicates on insert.
/// Deliberately a recency window, not global dedup: a guest who returns to a
/// subject after looking at a few other things gets a fresh entry.
const DEDUP_WINDOW: usize = 3;

// ============================================================================
// Entry Types
// ============================================================================

/// What kind of thing the guest looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Category,
    Subcategory,
    Guide,
    Search,
}

impl EntryKind {
    fn as_str(self) -> &'static str {
        match self {
            EntryKind::Category => "category",
            EntryKind::Subcategory => "subcategory",
            EntryKind::Guide => "guide",
            EntryKind::Search => "search",
        }
    }
}

/// The subject of a visit. `id` and `name` are always present; the rest is
/// optional context that lets the UI rebuild a "continue" link without a
/// lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Subject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One ledger entry, newest-first in storage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEntry {
    /// Derived identity: `kind-subjectId-timestamp`.
    pub id: String,
    pub kind: EntryKind,
    pub timestamp_ms: i64,
    pub subject: Subject,
}

/// A category with its visit count, for the frequency ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryVisits {
    pub id: String,
    pub name: String,
    pub visits: usize,
}

// ============================================================================
// Insert (pure)
// ============================================================================

/// Insert an entry at the front of the ledger, enforcing the dedup window and
/// the capacity bound. Returns false when the insert was suppressed as a
/// duplicate.
///
/// Kept free of I/O so the invariants can be property-tested directly.
fn insert_entry(
    entries: &mut Vec<VisitEntry>,
    kind: EntryKind,
    subject: Subject,
    timestamp_ms: i64,
) -> bool {
    let duplicate = entries
        .iter()
        .take(DEDUP_WINDOW)
        .any(|e| e.kind == kind && e.subject.id == subject.id);
    if duplicate {
        return false;
    }

    let entry = VisitEntry {
        id: format!("{}-{}-{}", kind.as_str(), subject.id, timestamp_ms),
        kind,
        timestamp_ms,
        subject,
    };
    entries.insert(0, entry);
    entries.truncate(MAX_HISTORY);
    true
}

// ============================================================================
// SessionHistory
// ============================================================================

/// The session-scoped visit ledger.
///
/// Holds at most [`MAX_HISTORY`] entries, newest first. Every mutation
/// rewrites the whole `session.history` record; the ledger is small and
/// bounded, so full re-serialization is cheaper than being clever.
///
/// Persistence is best-effort: a store failure degrades to an in-memory
/// ledger (logged), never to a caller-visible error.
pub struct SessionHistory {
    entries: Vec<VisitEntry>,
    store: Store,
}

impl SessionHistory {
    /// Load the ledger from the session record, or start empty.
    pub async fn load(store: Store) -> Self {
        let entries = match store.load_record::<Vec<VisitEntry>>(keys::SESSION_HISTORY).await {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load session history, starting empty");
                Vec::new()
            }
        };
        Self { entries, store }
    }

    /// Record a visit. Suppressed as a no-op when the same `(kind, subject
    /// id)` appears among the 3 most recent entries.
    pub async fn record(&mut self, kind: EntryKind, subject: Subject) {
        self.record_at(kind, subject, Utc::now().timestamp_millis())
            .await;
    }

    async fn record_at(&mut self, kind: EntryKind, subject: Subject, timestamp_ms: i64) {
        if insert_entry(&mut self.entries, kind, subject, timestamp_ms) {
            self.persist().await;
        }
    }

    /// The most recent `limit` entries, newest first, unfiltered.
    pub fn recent(&self, limit: usize) -> &[VisitEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }

    /// The entry to offer as "continue where you left off": the most recent
    /// guide, falling back to the most recent category. Searches are never
    /// offered.
    pub fn continue_item(&self) -> Option<&VisitEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == EntryKind::Guide)
            .or_else(|| self.entries.iter().find(|e| e.kind == EntryKind::Category))
    }

    /// Empty the ledger and remove the persisted record.
    pub async fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.store.delete_record(keys::SESSION_HISTORY).await {
            tracing::warn!(error = %e, "Failed to clear persisted session history");
        }
    }

    /// Category entries grouped by subject id, ranked by visit count
    /// descending. Ties keep first-encountered order, which in a newest-first
    /// ledger means the more recently seen category wins the tie.
    pub fn frequent_categories(&self, limit: usize) -> Vec<CategoryVisits> {
        let mut counts: Vec<CategoryVisits> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.kind == EntryKind::Category) {
            match counts.iter_mut().find(|c| c.id == entry.subject.id) {
                Some(c) => c.visits += 1,
                None => counts.push(CategoryVisits {
                    id: entry.subject.id.clone(),
                    name: entry.subject.name.clone(),
                    visits: 1,
                }),
            }
        }
        // Stable sort preserves first-encountered order between equal counts
        counts.sort_by(|a, b| b.visits.cmp(&a.visits));
        counts.truncate(limit);
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn persist(&self) {
        if let Err(e) = self
            .store
            .save_record(keys::SESSION_HISTORY, RecordScope::Session, &self.entries)
            .await
        {
            tracing::warn!(error = %e, "Failed to persist session history");
        }
    }
}

// ============================================================================
// Relative Time Labels
// ============================================================================

/// Coarse relative label for a ledger timestamp: "Just now", minutes, hours,
/// days, then a plain date for anything a week old or older.
pub fn time_ago(timestamp_ms: i64) -> String {
    time_ago_at(timestamp_ms, Utc::now().timestamp_millis())
}

fn time_ago_at(timestamp_ms: i64, now_ms: i64) -> String {
    const MINUTE: i64 = 60 * 1000;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let elapsed = now_ms.saturating_sub(timestamp_ms);

    if elapsed < MINUTE {
        return "Just now".to_string();
    }
    if elapsed < HOUR {
        let n = elapsed / MINUTE;
        return format!("{} minute{} ago", n, if n == 1 { "" } else { "s" });
    }
    if elapsed < DAY {
        let n = elapsed / HOUR;
        return format!("{} hour{} ago", n, if n == 1 { "" } else { "s" });
    }
    if elapsed < 7 * DAY {
        let n = elapsed / DAY;
        return format!("{} day{} ago", n, if n == 1 { "" } else { "s" });
    }

    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "Long ago".to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_history() -> SessionHistory {
        let store = Store::open(":memory:").await.unwrap();
        SessionHistory::load(store).await
    }

    fn subject(id: &str) -> Subject {
        Subject::new(id, format!("Name of {}", id))
    }

    #[tokio::test]
    async fn test_record_and_recent() {
        let mut history = test_history().await;
        history.record(EntryKind::Category, subject("beach")).await;
        history.record(EntryKind::Guide, subject("snorkeling")).await;

        let recent = history.recent(10);
        assert_eq!(recent.len(), 2);
        // Newest first
        assert_eq!(recent[0].subject.id, "snorkeling");
        assert_eq!(recent[1].subject.id, "beach");
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let mut history = test_history().await;
        for i in 0..10 {
            history
                .record(EntryKind::Category, subject(&format!("c{}", i)))
                .await;
        }
        assert_eq!(history.recent(3).len(), 3);
        assert_eq!(history.recent(3)[0].subject.id, "c9");
    }

    #[tokio::test]
    async fn test_duplicate_within_window_suppressed() {
        let mut history = test_history().await;
        history.record(EntryKind::Category, subject("beach")).await;
        history.record(EntryKind::Category, subject("beach")).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_same_id_different_kind_not_deduped() {
        let mut history = test_history().await;
        history.record(EntryKind::Category, subject("beach")).await;
        history.record(EntryKind::Guide, subject("beach")).await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_subject_reappears_after_window() {
        let mut history = test_history().await;
        history.record(EntryKind::Category, subject("beach")).await;
        history.record(EntryKind::Category, subject("spa")).await;
        history.record(EntryKind::Category, subject("golf")).await;
        history.record(EntryKind::Category, subject("dining")).await;
        // "beach" has now left the 3-entry window, so it records again
        history.record(EntryKind::Category, subject("beach")).await;
        assert_eq!(history.len(), 5);
        assert_eq!(history.recent(1)[0].subject.id, "beach");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let mut history = test_history().await;
        for i in 0..(MAX_HISTORY + 10) {
            history
                .record(EntryKind::Category, subject(&format!("c{}", i)))
                .await;
        }
        assert_eq!(history.len(), MAX_HISTORY);
        // Newest kept, oldest evicted
        assert_eq!(history.recent(1)[0].subject.id, "c59");
        assert!(!history
            .recent(MAX_HISTORY)
            .iter()
            .any(|e| e.subject.id == "c0"));
    }

    #[tokio::test]
    async fn test_continue_item_prefers_guide() {
        let mut history = test_history().await;
        history.record(EntryKind::Category, subject("beach")).await;
        history
            .record(EntryKind::Guide, Subject::new("g1", "Snorkeling"))
            .await;
        history.record(EntryKind::Category, subject("spa")).await;

        let item = history.continue_item().unwrap();
        assert_eq!(item.kind, EntryKind::Guide);
        assert_eq!(item.subject.name, "Snorkeling");
    }

    #[tokio::test]
    async fn test_continue_item_falls_back_to_category() {
        let mut history = test_history().await;
        history
            .record(EntryKind::Search, Subject::new("q1", "massage"))
            .await;
        history.record(EntryKind::Category, subject("spa")).await;

        let item = history.continue_item().unwrap();
        assert_eq!(item.kind, EntryKind::Category);
        assert_eq!(item.subject.id, "spa");
    }

    #[tokio::test]
    async fn test_continue_item_never_offers_search() {
        let mut history = test_history().await;
        history
            .record(EntryKind::Search, Subject::new("q1", "massage"))
            .await;
        assert!(history.continue_item().is_none());
    }

    #[tokio::test]
    async fn test_continue_item_empty_ledger() {
        let history = test_history().await;
        assert!(history.continue_item().is_none());
    }

    #[tokio::test]
    async fn test_clear_empties_and_removes_record() {
        let store = Store::open(":memory:").await.unwrap();
        let mut history = SessionHistory::load(store.clone()).await;
        history.record(EntryKind::Category, subject("beach")).await;
        history.clear().await;

        assert!(history.is_empty());
        let stored: Option<Vec<VisitEntry>> =
            store.load_record(keys::SESSION_HISTORY).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let store = Store::open(":memory:").await.unwrap();
        let mut history = SessionHistory::load(store.clone()).await;
        history.record(EntryKind::Guide, Subject::new("g1", "Snorkeling")).await;
        drop(history);

        let reloaded = SessionHistory::load(store).await;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.recent(1)[0].subject.id, "g1");
    }

    #[tokio::test]
    async fn test_frequent_categories_ranked_by_count() {
        let mut history = test_history().await;
        // beach x3, spa x2, singles for the rest; repeats spaced at least 3
        // entries apart so the dedup window never suppresses one
        for id in [
            "beach", "spa", "golf", "dining", "beach", "spa", "pool", "tennis", "beach",
        ] {
            history.record(EntryKind::Category, subject(id)).await;
        }
        assert_eq!(history.len(), 9);

        let ranked = history.frequent_categories(3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].id, "beach");
        assert_eq!(ranked[0].visits, 3);
        assert_eq!(ranked[1].id, "spa");
        assert_eq!(ranked[1].visits, 2);
    }

    #[tokio::test]
    async fn test_frequent_categories_ignores_other_kinds() {
        let mut history = test_history().await;
        history.record(EntryKind::Guide, subject("g1")).await;
        history.record(EntryKind::Search, subject("q1")).await;
        history.record(EntryKind::Category, subject("beach")).await;

        let ranked = history.frequent_categories(5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "beach");
    }

    // ========================================================================
    // time_ago tests
    // ========================================================================

    const MINUTE_MS: i64 = 60 * 1000;
    const HOUR_MS: i64 = 60 * MINUTE_MS;
    const DAY_MS: i64 = 24 * HOUR_MS;

    #[test]
    fn test_time_ago_just_now() {
        assert_eq!(time_ago_at(1_000_000, 1_000_000), "Just now");
        assert_eq!(time_ago_at(1_000_000, 1_000_000 + 59_000), "Just now");
    }

    #[test]
    fn test_time_ago_minutes() {
        assert_eq!(time_ago_at(0, MINUTE_MS), "1 minute ago");
        assert_eq!(time_ago_at(0, 5 * MINUTE_MS), "5 minutes ago");
        assert_eq!(time_ago_at(0, 59 * MINUTE_MS + 59_000), "59 minutes ago");
    }

    #[test]
    fn test_time_ago_hours() {
        assert_eq!(time_ago_at(0, HOUR_MS), "1 hour ago");
        assert_eq!(time_ago_at(0, 23 * HOUR_MS), "23 hours ago");
    }

    #[test]
    fn test_time_ago_days() {
        assert_eq!(time_ago_at(0, DAY_MS), "1 day ago");
        assert_eq!(time_ago_at(0, 6 * DAY_MS + 23 * HOUR_MS), "6 days ago");
    }

    #[test]
    fn test_time_ago_week_or_older_is_a_date() {
        // Timestamp comfortably inside 1970 so the local-timezone date
        // still falls in 1970 regardless of offset
        let visited = 30 * DAY_MS;
        let label = time_ago_at(visited, visited + 10 * DAY_MS);
        assert!(label.contains("1970"), "expected a date, got {:?}", label);
    }

    #[test]
    fn test_time_ago_future_timestamp_clamps() {
        // Clock skew: a timestamp slightly in the future reads as "Just now"
        assert_eq!(time_ago_at(5_000, 1_000), "Just now");
    }

    // ========================================================================
    // Ledger invariants (property-based)
    // ========================================================================

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        fn arb_kind() -> impl Strategy<Value = EntryKind> {
            prop_oneof![
                Just(EntryKind::Category),
                Just(EntryKind::Subcategory),
                Just(EntryKind::Guide),
                Just(EntryKind::Search),
            ]
        }

        proptest! {
            #[test]
            fn ledger_never_exceeds_capacity_and_stays_newest_first(
                ops in prop::collection::vec((arb_kind(), 0u8..20), 0..200)
            ) {
                let mut entries = Vec::new();
                for (i, (kind, subject_n)) in ops.into_iter().enumerate() {
                    insert_entry(
                        &mut entries,
                        kind,
                        Subject::new(format!("s{}", subject_n), "n"),
                        i as i64,
                    );
                    prop_assert!(entries.len() <= MAX_HISTORY);
                    prop_assert!(entries
                        .windows(2)
                        .all(|w| w[0].timestamp_ms >= w[1].timestamp_ms));
                }
            }

            #[test]
            fn no_duplicate_pair_within_dedup_window(
                ops in prop::collection::vec((arb_kind(), 0u8..6), 0..200)
            ) {
                let mut entries = Vec::new();
                for (i, (kind, subject_n)) in ops.into_iter().enumerate() {
                    insert_entry(
                        &mut entries,
                        kind,
                        Subject::new(format!("s{}", subject_n), "n"),
                        i as i64,
                    );
                }
                // After any sequence, the top 3 entries hold no repeated
                // (kind, subject id) pair
                let window: Vec<_> = entries
                    .iter()
                    .take(3)
                    .map(|e| (e.kind, e.subject.id.clone()))
                    .collect();
                for (i, a) in window.iter().enumerate() {
                    for b in window.iter().skip(i + 1) {
                        prop_assert_ne!(a, b);
                    }
                }
            }
        }
    }
}
