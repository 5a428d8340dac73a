use serde::{Deserialize, Serialize};

/// Where a campaign may be placed. The backend filters by slot; the client
/// re-checks defensively so a miscategorized campaign can never leak into the
/// wrong surface.
///
/// Unknown strings from a newer backend deserialize into [`SlotKind::Other`],
/// which no surface requests, so they are quarantined rather than fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Inline banner on category pages.
    Banner,
    /// Full-screen ambient rotation.
    Screensaver,
    /// Featured tile on the home surface.
    Featured,
    #[serde(other)]
    Other,
}

impl SlotKind {
    /// Query-parameter value for the campaign fetch.
    pub fn as_query(self) -> &'static str {
        match self {
            SlotKind::Banner => "banner",
            SlotKind::Screensaver => "screensaver",
            SlotKind::Featured => "featured",
            SlotKind::Other => "other",
        }
    }
}

/// How a campaign's media renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    #[serde(other)]
    Unsupported,
}

impl MediaType {
    pub fn label(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Unsupported => "unsupported media",
        }
    }
}

/// One active campaign, as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub campaign_name: String,
    pub media_type: MediaType,
    pub media_url: String,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub category_id: Option<String>,
    pub ad_type: SlotKind,
}
