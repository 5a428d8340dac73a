//! Integration tests for exposure cardinality: impressions are counted once
//! per surface per mount, reports are best-effort, and clicks are counted
//! before any external action is attempted.

use std::sync::Arc;
use std::time::Duration;

use cabana::campaign::{AdSlot, CampaignClient, SlotKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn campaign_json(id: i64, target_url: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "campaignName": format!("Campaign {}", id),
        "mediaType": "image",
        "mediaUrl": format!("https://cdn.example.com/{}.jpg", id),
        "targetUrl": target_url,
        "adType": "screensaver",
    })
}

async fn mock_candidates(server: &MockServer, ids: &[i64]) {
    let body: Vec<_> = ids.iter().map(|&id| campaign_json(id, None)).collect();
    Mock::given(method("GET"))
        .and(path("/api/campaigns/active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn count_posts(server: &MockServer, suffix: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path().ends_with(suffix))
        .count()
}

async fn mount_slot(server: &MockServer, rotate_ms: u64) -> AdSlot {
    let client = Arc::new(CampaignClient::new(server.uri(), None).unwrap());
    AdSlot::mount(
        client,
        SlotKind::Screensaver,
        None,
        Duration::from_millis(rotate_ms),
    )
    .await
}

// ============================================================================
// Per-Surface, Per-Mount Scoping
// ============================================================================

#[tokio::test]
async fn test_each_surface_counts_impressions_independently() {
    let server = MockServer::start().await;
    mock_candidates(&server, &[1, 2]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    // Two surfaces showing the same campaign pool
    let lobby = mount_slot(&server, 20).await;
    let room = mount_slot(&server, 20).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    // Each campaign is seen once on each surface: two counts per id
    for id in [1, 2] {
        assert_eq!(
            count_posts(&server, &format!("/{}/impression", id)).await,
            2,
            "campaign {} should be counted once per surface",
            id
        );
    }
    drop(lobby);
    drop(room);
}

#[tokio::test]
async fn test_remount_is_a_fresh_exposure_context() {
    let server = MockServer::start().await;
    mock_candidates(&server, &[7]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let first = mount_slot(&server, 50).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    drop(first);
    assert_eq!(count_posts(&server, "/7/impression").await, 1);

    let second = mount_slot(&server, 50).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    drop(second);
    assert_eq!(count_posts(&server, "/7/impression").await, 2);
}

// ============================================================================
// Best-Effort Reporting
// ============================================================================

#[tokio::test]
async fn test_failed_reports_are_not_retried_and_rotation_continues() {
    let server = MockServer::start().await;
    mock_candidates(&server, &[1, 2, 3]).await;
    // The counter backend is down
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let slot = mount_slot(&server, 20).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Rotation kept going regardless of the failures
    assert!(slot.rotating());

    // Exactly one attempt per campaign: failures are swallowed, not retried
    for id in [1, 2, 3] {
        assert_eq!(
            count_posts(&server, &format!("/{}/impression", id)).await,
            1,
            "campaign {} should be attempted exactly once",
            id
        );
    }
}

// ============================================================================
// Click Ordering
// ============================================================================

#[tokio::test]
async fn test_click_counted_before_external_action_is_attempted() {
    let server = MockServer::start().await;
    // Target fails URL validation, so the external action never runs; the
    // click count must land regardless
    Mock::given(method("GET"))
        .and(path("/api/campaigns/active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            campaign_json(9, Some("javascript:alert(1)")),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let slot = mount_slot(&server, 50).await;
    slot.click_current().await;
    slot.click_current().await;

    // One report per selection, action failure notwithstanding
    assert_eq!(count_posts(&server, "/9/click").await, 2);
}

#[tokio::test]
async fn test_click_report_failure_is_swallowed() {
    let server = MockServer::start().await;
    mock_candidates(&server, &[4]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let slot = mount_slot(&server, 50).await;
    // Must not panic or error: reporting is best-effort
    slot.click_current().await;
    assert_eq!(count_posts(&server, "/4/click").await, 1);
}
