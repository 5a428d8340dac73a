use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engagement::activity::ActivitySignal;
use crate::engagement::history::{SessionHistory, VisitEntry};
use crate::engagement::preferences::PreferenceTracker;
use crate::storage::{keys, RecordScope, Store, StoreError};

// ============================================================================
// Records
// ============================================================================

/// Durable screensaver configuration, shared with the management surface.
/// Written there, re-read here on store change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreensaverSettings {
    /// Seconds of inactivity before the ambient mode engages.
    pub timeout_secs: u64,
    /// Seconds each ambient slide is shown.
    pub rotation_secs: u64,
    pub enabled: bool,
}

impl Default for ScreensaverSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            rotation_secs: 8,
            enabled: true,
        }
    }
}

/// Durable activation counters, bumped only on genuine idle-triggered
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreensaverStats {
    pub activation_count: u64,
    pub last_activated_ms: Option<i64>,
}

// ============================================================================
// State Machine
// ============================================================================

/// The two lifetime states of the kiosk surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    /// The guest is (or was recently) interacting with the guide.
    Interactive,
    /// The ambient screensaver surface is showing.
    Ambient,
}

/// What caused an Ambient entry. Previews come from the management surface
/// and must not pollute the activation stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTrigger {
    Idle,
    Preview,
}

/// Content hints handed to the ambient surface on entry.
#[derive(Debug, Clone)]
pub struct AmbientView {
    pub greeting: String,
    pub continue_item: Option<VisitEntry>,
    pub suggested_categories: Vec<String>,
}

/// The Interactive/Ambient state machine.
///
/// Runs for the lifetime of the page: there is no terminal state, only
/// transitions driven by the activity monitor's edges and by explicit
/// preview/exit requests.
pub struct ScreensaverController {
    state: ScreenState,
    settings: ScreensaverSettings,
    stats: ScreensaverStats,
    store: Store,
}

impl ScreensaverController {
    /// Load settings and stats from the durable records, seeding settings
    /// with `seed` when no record exists yet (first run on this device).
    pub async fn load(store: Store, seed: ScreensaverSettings) -> Self {
        let settings = match store
            .load_record::<ScreensaverSettings>(keys::SCREENSAVER_SETTINGS)
            .await
        {
            Ok(Some(settings)) => settings,
            Ok(None) => seed,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load screensaver settings, using defaults");
                seed
            }
        };
        let stats = match store
            .load_record::<ScreensaverStats>(keys::SCREENSAVER_STATS)
            .await
        {
            Ok(Some(stats)) => stats,
            Ok(None) => ScreensaverStats::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load screensaver stats, starting at zero");
                ScreensaverStats::default()
            }
        };

        Self {
            state: ScreenState::Interactive,
            settings,
            stats,
            store,
        }
    }

    pub fn state(&self) -> ScreenState {
        self.state
    }

    /// True while the ambient surface is showing.
    pub fn is_active(&self) -> bool {
        self.state == ScreenState::Ambient
    }

    pub fn settings(&self) -> &ScreensaverSettings {
        &self.settings
    }

    pub fn stats(&self) -> &ScreensaverStats {
        &self.stats
    }

    /// Apply an activity monitor edge. Returns the new state when a
    /// transition happened.
    pub async fn handle_signal(&mut self, signal: ActivitySignal) -> Option<ScreenState> {
        match signal {
            ActivitySignal::Idle => {
                if !self.settings.enabled {
                    // The monitor is normally torn down while disabled; this
                    // covers the gap between a settings change and the
                    // monitor's reconfiguration
                    return None;
                }
                self.enter_ambient(ActivationTrigger::Idle).await
            }
            ActivitySignal::Active => self.exit_ambient(),
        }
    }

    /// Enter Ambient. Genuine idle entries bump the durable activation
    /// counters; previews leave them untouched. No-op when already Ambient.
    pub async fn enter_ambient(&mut self, trigger: ActivationTrigger) -> Option<ScreenState> {
        if self.state == ScreenState::Ambient {
            return None;
        }
        self.state = ScreenState::Ambient;
        tracing::info!(?trigger, "Screensaver engaged");

        if trigger == ActivationTrigger::Idle {
            self.stats.activation_count += 1;
            self.stats.last_activated_ms = Some(Utc::now().timestamp_millis());
            if let Err(e) = self
                .store
                .save_record(keys::SCREENSAVER_STATS, RecordScope::Durable, &self.stats)
                .await
            {
                tracing::warn!(error = %e, "Failed to persist screensaver stats");
            }
        }
        Some(ScreenState::Ambient)
    }

    /// Hand control back to the interactive UI. Used for both the activity
    /// edge and the ambient surface's explicit exit action. No-op when
    /// already Interactive.
    pub fn exit_ambient(&mut self) -> Option<ScreenState> {
        if self.state == ScreenState::Interactive {
            return None;
        }
        self.state = ScreenState::Interactive;
        tracing::info!("Screensaver dismissed");
        Some(ScreenState::Interactive)
    }

    /// Re-read settings from the durable record after a change notification.
    /// Returns the fresh settings when they differ, so the caller can
    /// reconfigure the idle monitor.
    pub async fn reload_settings(&mut self) -> Option<ScreensaverSettings> {
        let loaded = match self
            .store
            .load_record::<ScreensaverSettings>(keys::SCREENSAVER_SETTINGS)
            .await
        {
            Ok(Some(settings)) => settings,
            Ok(None) => ScreensaverSettings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reload screensaver settings");
                return None;
            }
        };

        if loaded == self.settings {
            return None;
        }
        tracing::info!(
            timeout_secs = loaded.timeout_secs,
            rotation_secs = loaded.rotation_secs,
            enabled = loaded.enabled,
            "Screensaver settings changed"
        );
        self.settings = loaded.clone();
        Some(loaded)
    }

    /// Persist new settings (the management surface's write path).
    pub async fn save_settings(
        &mut self,
        settings: ScreensaverSettings,
    ) -> Result<(), StoreError> {
        self.store
            .save_record(keys::SCREENSAVER_SETTINGS, RecordScope::Durable, &settings)
            .await?;
        self.settings = settings;
        Ok(())
    }

    /// Compose the content hints for the ambient surface from the ledger and
    /// the aggregator.
    pub fn ambient_view(
        &self,
        history: &SessionHistory,
        prefs: &PreferenceTracker,
    ) -> AmbientView {
        AmbientView {
            greeting: prefs.greeting(),
            continue_item: history.continue_item().cloned(),
            suggested_categories: prefs.suggested_categories(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
