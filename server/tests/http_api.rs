//! Integration tests for the HTTP surface, driving the router directly with
//! `tower::ServiceExt::oneshot` rather than binding a real socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depgraph_server::state::{AppContext, RepoState, ServerState};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

fn test_ctx(repo_names: &[&str]) -> AppContext {
    let mut repos = BTreeMap::new();
    for name in repo_names {
        let dir = tempfile::tempdir().unwrap();
        // leak the tempdir so the path stays valid for the test's lifetime
        let root = dir.into_path();
        repos.insert((*name).to_string(), RepoState::new((*name).to_string(), root));
    }
    let state = Arc::new(RwLock::new(ServerState::new(repos)));
    AppContext { state, start_time: std::time::Instant::now() }
}

#[tokio::test]
async fn health_reports_repo_count() {
    let ctx = test_ctx(&["default"]);
    let app = depgraph_server::build_router(ctx);

    let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["repos"], 1);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn unknown_repo_graph_is_404() {
    let ctx = test_ctx(&["default"]);
    let app = depgraph_server::build_router(ctx);

    let response =
        app.oneshot(Request::builder().uri("/api/graph/nope").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn known_repo_graph_is_served() {
    let ctx = test_ctx(&["default"]);
    let app = depgraph_server::build_router(ctx);

    let response =
        app.oneshot(Request::builder().uri("/api/graph/default").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["nodes"].is_array());
    assert!(json["edges"].is_array());
}

#[tokio::test]
async fn reset_clears_an_empty_repo_without_error() {
    let ctx = test_ctx(&["default"]);
    let app = depgraph_server::build_router(ctx);

    let response = app
        .oneshot(Request::builder().method("POST").uri("/api/reset/default").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_repos_returns_configured_names() {
    let ctx = test_ctx(&["a", "b"]);
    let app = depgraph_server::build_router(ctx);

    let response = app.oneshot(Request::builder().uri("/api/repos").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = json["repos"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(names, vec!["a", "b"]);
}
