use chrono::{Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{keys, RecordScope, Store};

/// Size of the frequent-categories ranking.
const FREQUENT_CAP: usize = 5;
/// Entries kept per time-of-day bucket.
const BUCKET_CAP: usize = 3;
/// Search history depth.
const SEARCH_CAP: usize = 20;
/// Suggestions returned to the UI.
const SUGGESTION_CAP: usize = 5;
/// Minutes of absence after which a guest counts as returning.
const RETURNING_AFTER_MINUTES: i64 = 60;

// ============================================================================
// Record Types
// ============================================================================

/// Time-of-day bucket for affinity tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
}

impl TimeBucket {
    /// Bucket for an hour of day: before 12 morning, before 17 afternoon,
    /// evening otherwise.
    pub fn from_hour(hour: u32) -> Self {
        if hour < 12 {
            TimeBucket::Morning
        } else if hour < 17 {
            TimeBucket::Afternoon
        } else {
            TimeBucket::Evening
        }
    }

    /// Bucket for the kiosk's local clock right now.
    pub fn current() -> Self {
        Self::from_hour(Local::now().hour())
    }

    fn salutation(self) -> &'static str {
        match self {
            TimeBucket::Morning => "Good morning",
            TimeBucket::Afternoon => "Good afternoon",
            TimeBucket::Evening => "Good evening",
        }
    }
}

/// Per-bucket category affinity lists, newest-first, capped at
/// [`BUCKET_CAP`], no duplicates within a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeBasedPreferences {
    pub morning: Vec<String>,
    pub afternoon: Vec<String>,
    pub evening: Vec<String>,
}

impl TimeBasedPreferences {
    pub fn bucket(&self, bucket: TimeBucket) -> &[String] {
        match bucket {
            TimeBucket::Morning => &self.morning,
            TimeBucket::Afternoon => &self.afternoon,
            TimeBucket::Evening => &self.evening,
        }
    }

    fn bucket_mut(&mut self, bucket: TimeBucket) -> &mut Vec<String> {
        match bucket {
            TimeBucket::Morning => &mut self.morning,
            TimeBucket::Afternoon => &mut self.afternoon,
            TimeBucket::Evening => &mut self.evening,
        }
    }
}

/// Which optional home-surface blocks the guest wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayPreferences {
    pub show_continue_reading: bool,
    pub show_quick_actions: bool,
    pub show_weather: bool,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            show_continue_reading: true,
            show_quick_actions: true,
            show_weather: true,
        }
    }
}

/// One category's lifetime view tally.
///
/// View counts live in an insertion-ordered list rather than a map: the
/// frequent-categories ranking breaks count ties by first-seen order, which a
/// hash map cannot promise and a JSON object does not round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub id: String,
    pub views: u32,
}

/// The durable guest preference record.
///
/// Every field defaults independently so records written by older or newer
/// builds load cleanly, unknown fields ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestPreferences {
    pub preferred_language: String,
    /// Top categories by view count, highest first. Recomputed on every view
    /// so the stored record always matches what the accessors return.
    pub frequent_categories: Vec<String>,
    pub time_based_preferences: TimeBasedPreferences,
    pub last_visited_ms: Option<i64>,
    pub view_counts: Vec<CategoryCount>,
    /// Past search queries, most recent first, exact-deduplicated.
    pub search_history: Vec<String>,
    pub display_preferences: DisplayPreferences,
}

impl Default for GuestPreferences {
    fn default() -> Self {
        Self {
            preferred_language: "en".to_string(),
            frequent_categories: Vec::new(),
            time_based_preferences: TimeBasedPreferences::default(),
            last_visited_ms: None,
            view_counts: Vec::new(),
            search_history: Vec::new(),
            display_preferences: DisplayPreferences::default(),
        }
    }
}

// ============================================================================
// PreferenceTracker
// ============================================================================

/// The preference aggregator: owns the durable guest record and derives the
/// personalization signals from it.
///
/// Every mutation rewrites the full record (`guest.preferences`): one small
/// object, read-modify-write, not a key-value scatter. Store failures degrade
/// to in-memory state, logged.
pub struct PreferenceTracker {
    prefs: GuestPreferences,
    store: Store,
}

impl PreferenceTracker {
    /// Load the guest record, or start from defaults. A fresh record adopts
    /// `default_language` (the config-seeded language) until the guest picks
    /// one.
    pub async fn load(store: Store, default_language: &str) -> Self {
        let prefs = match store
            .load_record::<GuestPreferences>(keys::GUEST_PREFERENCES)
            .await
        {
            Ok(Some(prefs)) => prefs,
            Ok(None) => GuestPreferences {
                preferred_language: default_language.to_string(),
                ..GuestPreferences::default()
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load guest preferences, using defaults");
                GuestPreferences::default()
            }
        };
        Self { prefs, store }
    }

    /// Read-only view of the record.
    pub fn prefs(&self) -> &GuestPreferences {
        &self.prefs
    }

    /// Count a category view: bumps the tally, re-ranks the frequent list,
    /// files the category under the current time bucket, and stamps the
    /// visit time.
    pub async fn track_category_view(&mut self, category_id: &str) {
        self.apply_category_view(
            category_id,
            TimeBucket::current(),
            Utc::now().timestamp_millis(),
        );
        self.persist().await;
    }

    fn apply_category_view(&mut self, category_id: &str, bucket: TimeBucket, now_ms: i64) {
        match self
            .prefs
            .view_counts
            .iter_mut()
            .find(|c| c.id == category_id)
        {
            Some(count) => count.views += 1,
            None => self.prefs.view_counts.push(CategoryCount {
                id: category_id.to_string(),
                views: 1,
            }),
        }

        // Stable sort over the insertion-ordered tallies: ties keep
        // first-seen order
        let mut ranked = self.prefs.view_counts.clone();
        ranked.sort_by(|a, b| b.views.cmp(&a.views));
        self.prefs.frequent_categories = ranked
            .into_iter()
            .take(FREQUENT_CAP)
            .map(|c| c.id)
            .collect();

        let list = self.prefs.time_based_preferences.bucket_mut(bucket);
        if !list.iter().any(|c| c == category_id) {
            list.insert(0, category_id.to_string());
            list.truncate(BUCKET_CAP);
        }

        self.prefs.last_visited_ms = Some(now_ms);
    }

    /// Remember a search query, most recent first. Blank queries are ignored;
    /// a repeated query moves to the front instead of duplicating.
    pub async fn record_search(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }

        self.prefs.search_history.retain(|q| q != query);
        self.prefs.search_history.insert(0, query.to_string());
        self.prefs.search_history.truncate(SEARCH_CAP);
        self.persist().await;
    }

    /// Categories to surface right now: the current time bucket's list
    /// followed by the global frequent list, first-seen-deduplicated, capped.
    pub fn suggested_categories(&self) -> Vec<String> {
        self.suggested_categories_for(TimeBucket::current())
    }

    fn suggested_categories_for(&self, bucket: TimeBucket) -> Vec<String> {
        let mut suggestions: Vec<String> = Vec::with_capacity(SUGGESTION_CAP);
        let candidates = self
            .prefs
            .time_based_preferences
            .bucket(bucket)
            .iter()
            .chain(self.prefs.frequent_categories.iter());
        for category in candidates {
            if suggestions.len() == SUGGESTION_CAP {
                break;
            }
            if !suggestions.contains(category) {
                suggestions.push(category.clone());
            }
        }
        suggestions
    }

    /// The most recent search queries, for the search box dropdown.
    pub fn search_suggestions(&self) -> &[String] {
        let n = SUGGESTION_CAP.min(self.prefs.search_history.len());
        &self.prefs.search_history[..n]
    }

    /// True when the guest has been away for more than an hour.
    pub fn is_returning(&self) -> bool {
        self.is_returning_at(Utc::now().timestamp_millis())
    }

    fn is_returning_at(&self, now_ms: i64) -> bool {
        self.prefs
            .last_visited_ms
            .is_some_and(|last| now_ms - last > RETURNING_AFTER_MINUTES * 60 * 1000)
    }

    /// Time-of-day salutation, with a returning-visitor clause when the guest
    /// has been away for a while.
    pub fn greeting(&self) -> String {
        self.greeting_at(TimeBucket::current(), Utc::now().timestamp_millis())
    }

    fn greeting_at(&self, bucket: TimeBucket, now_ms: i64) -> String {
        let salutation = bucket.salutation();
        if self.is_returning_at(now_ms) {
            format!("{}, welcome back!", salutation)
        } else {
            format!("{}!", salutation)
        }
    }

    /// Restore defaults and remove the persisted record.
    pub async fn reset(&mut self) {
        self.prefs = GuestPreferences::default();
        if let Err(e) = self.store.delete_record(keys::GUEST_PREFERENCES).await {
            tracing::warn!(error = %e, "Failed to clear persisted guest preferences");
        }
    }

    async fn persist(&self) {
        if let Err(e) = self
            .store
            .save_record(keys::GUEST_PREFERENCES, RecordScope::Durable, &self.prefs)
            .await
        {
            tracing::warn!(error = %e, "Failed to persist guest preferences");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
