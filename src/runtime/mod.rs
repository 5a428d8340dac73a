//! The kiosk runtime shell.
//!
//! Everything here is host-application plumbing: it feeds terminal input to
//! the engine and relays the engine's transitions, but owns no engagement
//! logic of its own.

mod loop_runner;

pub use loop_runner::run;

use tokio::sync::mpsc;

use crate::campaign::AdSlot;
use crate::engagement::activity::{ActivitySignal, MonitorHandle};
use crate::engagement::history::SessionHistory;
use crate::engagement::preferences::PreferenceTracker;
use crate::engagement::screensaver::ScreensaverController;
use crate::storage::Store;

/// The assembled kiosk: every engine component plus the channels wiring them
/// together. Built in `main`, driven by [`run`].
pub struct Kiosk {
    pub store: Store,
    pub monitor: MonitorHandle,
    pub signals: mpsc::UnboundedReceiver<ActivitySignal>,
    pub controller: ScreensaverController,
    pub history: SessionHistory,
    pub prefs: PreferenceTracker,
    pub ads: Option<AdSlot>,
    /// Location prefixes where the screensaver never engages; needed when
    /// the monitor is reconfigured after a settings change.
    pub excluded_prefixes: Vec<String>,
}
