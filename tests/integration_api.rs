//! Integration tests for the REST API feature.

#![cfg(feature = "api")]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use glm_manager::api::{AppState, router};
use glm_manager::config::PrepConfig;
use glm_manager::prep;

/// Prepare the fixture feeder with the runnable preset and return the API state.
fn build_api_state() -> Arc<AppState> {
    let mut manager = common::feeder();
    let recipe = PrepConfig::runnable();
    prep::apply(&mut manager, &recipe).unwrap();
    Arc::new(AppState::new(manager))
}

async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
    let app = router(build_api_state());
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn prepared_summary_endpoint() {
    let (status, json) = get_json("/summary").await;
    assert_eq!(status, StatusCode::OK);

    // Run components add the reliability and generators modules.
    let modules: Vec<&str> = json["modules"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m.as_str())
        .collect();
    assert!(modules.contains(&"reliability"));
    assert!(modules.contains(&"powerflow"));
    assert_eq!(json["object_types"]["fault_check"], 1);
    assert_eq!(json["clock"]["starttime"], "'2020-01-01 00:00:00'");
    assert_eq!(json["clock"]["timezone"], "UTC0");
}

#[tokio::test]
async fn quoted_names_resolve_through_the_path() {
    let (status, json) = get_json("/objects/substation/%22sourcebus%22").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["type"], "substation");
    assert_eq!(json["properties"]["bustype"], "SWING");
}

#[tokio::test]
async fn missing_objects_return_404() {
    let (status, json) = get_json("/objects/house").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("house"));

    let (status, _) = get_json("/objects/node/n999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn glm_endpoint_serves_parseable_text() {
    let app = router(build_api_state());
    let req = Request::builder().uri("/glm").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let model = glm_manager::glm::parse_str(&text).unwrap();
    assert!(model.len() > 21);
}
