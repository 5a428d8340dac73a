use std::borrow::Cow;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use super::types::{Campaign, SlotKind};
use crate::util::strip_control_chars;

/// Per-request time budget. Campaign traffic is small JSON; anything slower
/// than this is treated as a failed report.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Request timed out after {}s", REQUEST_TIMEOUT.as_secs())]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Insecure backend URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Client for the guide backend's campaign endpoints: the active-campaign
/// list plus the impression and click counters.
///
/// Reports are best-effort with no retries; callers log failures and move on.
pub struct CampaignClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl CampaignClient {
    /// Build a client for `base_url`, optionally authenticating with a
    /// device token.
    ///
    /// HTTPS is enforced for the base URL so the token cannot leak over
    /// plaintext; HTTP is allowed only for localhost (test servers).
    pub fn new(
        base_url: impl Into<String>,
        token: Option<SecretString>,
    ) -> Result<Self, CampaignError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        if !base_url.starts_with("https://") {
            let is_localhost = base_url.starts_with("http://127.0.0.1")
                || base_url.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS backend URL");
                return Err(CampaignError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base_url, "Using non-HTTPS backend URL (localhost only)");
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        })
    }

    /// Fetch the active campaigns for a slot, optionally narrowed to a
    /// category.
    ///
    /// The backend does the filtering; the client re-applies both filters as
    /// a defensive check and sanitizes display names before they reach logs
    /// or storage.
    pub async fn fetch_active(
        &self,
        slot: SlotKind,
        category: Option<&str>,
    ) -> Result<Vec<Campaign>, CampaignError> {
        let mut request = self
            .http
            .get(format!("{}/api/campaigns/active", self.base_url))
            .query(&[("slot", slot.as_query())]);
        if let Some(category) = category {
            request = request.query(&[("category", category)]);
        }
        request = self.authorize(request);

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| CampaignError::Timeout)?
            .map_err(CampaignError::Network)?;

        if !response.status().is_success() {
            return Err(CampaignError::HttpStatus(response.status().as_u16()));
        }

        let mut campaigns: Vec<Campaign> =
            response.json().await.map_err(CampaignError::Network)?;

        campaigns.retain(|c| {
            c.ad_type == slot
                && match (category, c.category_id.as_deref()) {
                    // Untargeted campaigns run everywhere
                    (_, None) | (None, _) => true,
                    (Some(wanted), Some(targeted)) => wanted == targeted,
                }
        });

        for campaign in &mut campaigns {
            let name = std::mem::take(&mut campaign.campaign_name);
            campaign.campaign_name = match strip_control_chars(&name) {
                Cow::Borrowed(_) => name,
                Cow::Owned(clean) => {
                    tracing::warn!(campaign_id = campaign.id, "Sanitized campaign name");
                    clean
                }
            };
        }

        tracing::debug!(
            slot = slot.as_query(),
            category = category.unwrap_or("(any)"),
            count = campaigns.len(),
            "Fetched active campaigns"
        );
        Ok(campaigns)
    }

    /// Count one impression for a campaign.
    pub async fn report_impression(&self, id: i64) -> Result<(), CampaignError> {
        self.post_counter(id, "impression").await
    }

    /// Count one click for a campaign.
    pub async fn report_click(&self, id: i64) -> Result<(), CampaignError> {
        self.post_counter(id, "click").await
    }

    async fn post_counter(&self, id: i64, counter: &str) -> Result<(), CampaignError> {
        let request = self.authorize(
            self.http
                .post(format!("{}/api/campaigns/{}/{}", self.base_url, id, counter)),
        );

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| CampaignError::Timeout)?
            .map_err(CampaignError::Network)?;

        if !response.status().is_success() {
            return Err(CampaignError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }
}
