use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::api::CampaignClient;
use super::rotation::AdRotation;
use super::types::{Campaign, SlotKind};
use crate::util::validate_target_url;

/// A mounted campaign surface.
///
/// Owns the per-mount rotation state and at most one rotation interval. The
/// slot is the disposer for that interval: dropping it (or replacing the
/// interval via [`set_rotation_interval`](Self::set_rotation_interval))
/// aborts the running rotor before anything new is armed, so two timers
/// never overlap.
///
/// All reporting is best-effort. Impressions are dispatched fire-and-forget;
/// clicks are reported inline so the count always lands before the external
/// action runs. Failures are logged and never block rendering or rotation.
pub struct AdSlot {
    rotation: Arc<Mutex<AdRotation>>,
    client: Arc<CampaignClient>,
    slot: SlotKind,
    category: Option<String>,
    rotate_every: Duration,
    rotor: Option<JoinHandle<()>>,
}

fn lock(rotation: &Mutex<AdRotation>) -> MutexGuard<'_, AdRotation> {
    // A panic while holding this lock leaves plain rotation state, nothing
    // protocol-critical: recover the guard rather than propagating poison
    rotation.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AdSlot {
    /// Mount a surface: fetch the candidate list for `slot` (optionally
    /// narrowed to a category), report the first impression, and start the
    /// rotation interval when more than one candidate exists.
    ///
    /// A failed fetch mounts an empty surface; the kiosk renders without
    /// ads rather than failing.
    pub async fn mount(
        client: Arc<CampaignClient>,
        slot: SlotKind,
        category: Option<String>,
        rotate_every: Duration,
    ) -> Self {
        let mut surface = Self {
            rotation: Arc::new(Mutex::new(AdRotation::new())),
            client,
            slot,
            category,
            rotate_every,
            rotor: None,
        };
        surface.refresh().await;
        surface
    }

    /// Refetch the candidate list. A successful fetch replaces the list,
    /// which resets the impressed-id set (a new list identity is a new
    /// exposure context); a failed fetch keeps whatever is showing.
    pub async fn refresh(&mut self) {
        match self
            .client
            .fetch_active(self.slot, self.category.as_deref())
            .await
        {
            Ok(campaigns) => {
                lock(&self.rotation).set_candidates(campaigns);
                self.report_current_if_new();
                self.sync_rotor();
            }
            Err(e) => {
                tracing::warn!(
                    slot = self.slot.as_query(),
                    error = %e,
                    "Campaign fetch failed, keeping current candidates"
                );
            }
        }
    }

    /// The campaign currently showing. Safe to call on every render; it
    /// never re-reports.
    pub fn current(&self) -> Option<Campaign> {
        lock(&self.rotation).current().cloned()
    }

    /// Guest selected the current campaign: count the click, then perform
    /// the campaign's external action. The count is never skipped, even when
    /// the action fails or the target is unusable.
    pub async fn click_current(&self) {
        let Some(campaign) = self.current() else {
            return;
        };

        if let Err(e) = self.client.report_click(campaign.id).await {
            tracing::warn!(campaign_id = campaign.id, error = %e, "Click report failed");
        }

        let Some(target) = campaign.target_url.as_deref() else {
            return;
        };
        match validate_target_url(target) {
            Ok(url) => {
                if let Err(e) = open::that(url.as_str()) {
                    tracing::warn!(
                        campaign_id = campaign.id,
                        error = %e,
                        "Failed to open campaign target"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    campaign_id = campaign.id,
                    target = %target,
                    error = %e,
                    "Refusing to open campaign target"
                );
            }
        }
    }

    /// Replace the rotation cadence (screensaver settings change). The old
    /// interval is always cancelled before a new one is armed.
    pub fn set_rotation_interval(&mut self, every: Duration) {
        self.rotate_every = every;
        if let Some(rotor) = self.rotor.take() {
            rotor.abort();
        }
        self.sync_rotor();
    }

    /// Whether the rotation interval is currently running.
    pub fn rotating(&self) -> bool {
        self.rotor.as_ref().is_some_and(|r| !r.is_finished())
    }

    fn report_current_if_new(&self) {
        if let Some(id) = lock(&self.rotation).take_unreported() {
            dispatch_impression(&self.client, id);
        }
    }

    fn sync_rotor(&mut self) {
        let enabled = lock(&self.rotation).rotation_enabled();
        if enabled {
            if !self.rotating() {
                self.rotor = Some(spawn_rotor(
                    Arc::clone(&self.rotation),
                    Arc::clone(&self.client),
                    self.rotate_every,
                ));
            }
        } else if let Some(rotor) = self.rotor.take() {
            rotor.abort();
        }
    }
}

impl Drop for AdSlot {
    fn drop(&mut self) {
        if let Some(rotor) = self.rotor.take() {
            rotor.abort();
        }
    }
}

/// The rotation interval task: advance the cursor each tick and report the
/// newly-current campaign the first time it shows. Exits on its own when the
/// candidate list shrinks below two.
fn spawn_rotor(
    rotation: Arc<Mutex<AdRotation>>,
    client: Arc<CampaignClient>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval's first tick completes immediately; the current campaign
        // was already handled at mount/refresh
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let unreported = {
                let mut rotation = lock(&rotation);
                if !rotation.rotation_enabled() {
                    break;
                }
                rotation.advance();
                rotation.take_unreported()
            };
            if let Some(id) = unreported {
                dispatch_impression(&client, id);
            }
        }
    })
}

fn dispatch_impression(client: &Arc<CampaignClient>, id: i64) {
    let client = Arc::clone(client);
    tokio::spawn(async move {
        if let Err(e) = client.report_impression(id).await {
            tracing::warn!(campaign_id = id, error = %e, "Impression report failed");
        }
    });
}
