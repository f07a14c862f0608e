//! Health Endpoint Integration Tests
//!
//! Exercises the health router in-process against a hub with a mocked feed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use common::{Attempt, quote_json, scripted_connector, transport_config};
use market_data_hub::infrastructure::health::router;
use market_data_hub::{
    Connector, HealthServerState, HubOptions, JsonFeedCodec, MarketDataHub, ThrottleConfig,
};

fn hub(connector: &common::ScriptedConnector) -> Arc<MarketDataHub> {
    Arc::new(MarketDataHub::new(
        Arc::clone(&connector.connector) as Arc<dyn Connector>,
        Arc::new(JsonFeedCodec::new()),
        HubOptions {
            transport: transport_config(),
            throttle: ThrottleConfig::default(),
            ..HubOptions::default()
        },
    ))
}

async fn get(hub: &Arc<MarketDataHub>, path: &str) -> (StatusCode, String) {
    let app = router(Arc::new(HealthServerState::new("test-0.0.1", Arc::clone(hub))));
    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let connector = scripted_connector([]);
    let hub = hub(&connector);

    assert_eq!(get(&hub, "/healthz").await, (StatusCode::OK, "OK".to_string()));
}

#[tokio::test]
async fn disconnected_hub_is_unhealthy_and_not_ready() {
    let connector = scripted_connector([]);
    let hub = hub(&connector);

    let (status, body) = get(&hub, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["version"], "test-0.0.1");
    assert_eq!(json["connection"]["state"], "disconnected");

    let (status, _) = get(&hub, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn connected_hub_reports_pipeline_figures() {
    let mut connector = scripted_connector([Attempt::Succeed]);
    let hub = hub(&connector);
    let mut updates = hub.subscribe_updates();
    hub.connect().await.unwrap();
    hub.subscribe(["AAPL"]).await.unwrap();
    let feed = connector.next_feed().await;

    feed.push_text(quote_json("AAPL", "10", "11"));
    updates.recv().await.unwrap();

    let (status, body) = get(&hub, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["connection"]["connected"], true);
    assert_eq!(json["subscriptions"]["symbols"], 1);
    assert_eq!(json["subscriptions"]["cached_quotes"], 1);
    assert_eq!(json["subscriptions"]["consumers"], 1);
    assert_eq!(json["pipeline"]["admitted"], 1);

    assert_eq!(get(&hub, "/readyz").await, (StatusCode::OK, "READY".to_string()));
    hub.disconnect().await;
}
