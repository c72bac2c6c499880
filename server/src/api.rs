//! HTTP surface (spec §6): a merged-graph endpoint, a crawl trigger, a
//! reset, and a health check. No auth, no static file serving — those
//! belong to the out-of-scope desktop controller.

use crate::orchestrate;
use crate::state::AppContext;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    repos: usize,
    uptime_seconds: u64,
}

pub async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let state = ctx.state.read().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        repos: state.repos.len(),
        uptime_seconds: ctx.start_time.elapsed().as_secs(),
    })
}

pub async fn list_repos(State(ctx): State<AppContext>) -> impl IntoResponse {
    let state = ctx.state.read().await;
    let names: Vec<&str> = state.repos.keys().map(String::as_str).collect();
    Json(json!({ "repos": names }))
}

/// Serializes one repo's merged, classified graph in the wire shape
/// described by spec §6, annotated with `statusByProfile`/`primaryByProfile`.
fn graph_json(repo: &crate::state::RepoState) -> serde_json::Value {
    let nodes: Vec<serde_json::Value> = repo
        .graph
        .nodes
        .iter()
        .map(|(canon_id, n)| {
            // Emit the canonical id, not `n.id`'s first-seen display
            // spelling: edges and classification are both keyed canonically,
            // so a node's emitted `id` must match to satisfy "every emitted
            // edge's endpoints exist in nodes" (spec §8 invariant #1).
            let classification = repo.classification.get(canon_id);
            let mut obj = json!({
                "id": canon_id,
                "type": n.node_type,
                "state": n.state,
                "lang": n.lang,
                "sizeLOC": n.size_loc,
            });
            if let Some(c) = classification {
                obj["statusByProfile"] = json!(c.status_by_profile);
                obj["primaryByProfile"] = json!(c.primary_by_profile);
                obj["reachableProfiles"] = json!(c.reachable_profiles);
            }
            for (k, v) in &n.extra {
                obj[k] = v.clone();
            }
            obj
        })
        .collect();

    let edges: Vec<serde_json::Value> = repo
        .graph
        .edges
        .iter()
        .map(|e| {
            let mut obj = json!({ "source": e.source, "target": e.target, "kind": e.kind });
            for (k, v) in &e.extra {
                obj[k] = v.clone();
            }
            obj
        })
        .collect();

    json!({
        "nodes": nodes,
        "edges": edges,
        "entrypoints": repo.graph.entrypoints,
        "exports": repo.graph.exports,
        "securityFindings": repo.graph.security_findings,
    })
}

pub async fn get_graph(State(ctx): State<AppContext>, AxumPath(name): AxumPath<String>) -> impl IntoResponse {
    let state = ctx.state.read().await;
    match state.repos.get(&name) {
        Some(repo) => (StatusCode::OK, Json(graph_json(repo))).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown repo {name}")).into_response(),
    }
}

pub async fn crawl_repo(State(ctx): State<AppContext>, AxumPath(name): AxumPath<String>) -> impl IntoResponse {
    let mut state = ctx.state.write().await;
    match state.repos.get_mut(&name) {
        Some(repo) => {
            orchestrate::crawl_and_merge(&repo.root.clone(), &mut repo.graph);
            repo.reclassify();
            repo.last_crawl = Some(std::time::Instant::now());
            (StatusCode::OK, Json(graph_json(repo))).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("unknown repo {name}")).into_response(),
    }
}

pub async fn reset_repo(State(ctx): State<AppContext>, AxumPath(name): AxumPath<String>) -> impl IntoResponse {
    let mut state = ctx.state.write().await;
    match state.repos.get_mut(&name) {
        Some(repo) => {
            repo.graph.reset();
            repo.classification.clear();
            (StatusCode::OK, Json(json!({ "status": "reset" }))).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("unknown repo {name}")).into_response(),
    }
}
