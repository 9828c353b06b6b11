//! HTTP surface tests
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot` over
//! memory backends.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use hermes_distribution::config::Settings;
use hermes_distribution::directory::MemoryDirectory;
use hermes_distribution::distribution::{DistributionConsumer, RecipientResolver};
use hermes_distribution::distribution_log::{DistributionLogBackend, LogKey, LogState, MemoryLogBackend};
use hermes_distribution::queue::MemoryJobQueue;
use hermes_distribution::server::{create_app, AppState};
use hermes_distribution::store::MemoryEventStore;

fn create_state(log: Option<Arc<dyn DistributionLogBackend>>) -> AppState {
    AppState {
        settings: Arc::new(Settings::default()),
        distribution_log: log,
    }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = create_app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_distribution_log_lookup() {
    let log = Arc::new(MemoryLogBackend::new());
    let raw = json!({ "id": "m-1", "type": "order.shipped" });
    log.mark_received(
        LogKey {
            id: "m-1",
            queue: "distribution",
            message_type: "order.shipped",
        },
        &raw,
        chrono::Utc::now(),
    )
    .await
    .unwrap();
    log.mark_state("m-1", LogState::Submitted, None, chrono::Utc::now())
        .await
        .unwrap();

    let (status, body) = get(
        create_state(Some(log as Arc<dyn DistributionLogBackend>)),
        "/distribution-logs/m-1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let entry: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(entry["id"], json!("m-1"));
    assert_eq!(entry["state"], json!("submitted"));
    assert_eq!(entry["messageType"], json!("order.shipped"));
    assert_eq!(entry["attempts"], json!(1));
    assert_eq!(entry["data"], raw);
}

#[tokio::test]
async fn test_unknown_distribution_log_is_404() {
    let log: Arc<dyn DistributionLogBackend> = Arc::new(MemoryLogBackend::new());
    let (status, body) = get(create_state(Some(log)), "/distribution-logs/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_disabled_distribution_log_is_404() {
    let (status, _) = get(create_state(None), "/distribution-logs/m-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let consumer = DistributionConsumer::new(
        "distribution",
        Arc::new(MemoryEventStore::new()),
        RecipientResolver::new(Arc::new(MemoryDirectory::new()), Duration::from_secs(1)),
        Arc::new(MemoryJobQueue::new()),
    );
    consumer
        .handle_payload(&json!({ "id": "m-1", "type": "x" }))
        .await;

    let (status, body) = get(create_state(None), "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("hermes_distribution_messages_received_total"));
    assert!(text.contains("hermes_distribution_outcomes_total"));
}
