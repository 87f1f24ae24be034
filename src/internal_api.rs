// src/internal_api.rs

//! The three internal cluster-management endpoints (trust confirmation,
//! schema-version upgrade notices, and new-member broadcasts), mounted
//! under `/1.0/internal/…`. Everything else an embedder needs lives in its
//! own extension servers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, post};
use axum::{Router, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::endpoint::Envelope;
use crate::orchestrator::OrchestratorHandle;
use crate::trust::Remote;

#[derive(Debug, Deserialize)]
struct ClusterMemberLocal {
    name: String,
    address: String,
    certificate: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct HookNewMemberOptions {
    name: String,
}

/// Builds the `/1.0/internal` router, with `state` reachable by every
/// handler.
pub fn internal_router(state: Arc<dyn OrchestratorHandle>) -> Router {
    Router::new()
        .route("/1.0/internal/cluster", post(add_cluster_member))
        .route("/1.0/internal/database", patch(notify_database_upgrade))
        .route(
            "/1.0/internal/hooks/newmember",
            post(run_new_member_hook),
        )
        .with_state(state)
}

/// `POST /1.0/internal/cluster` — leader-only; inserts the member into the
/// trust store.
async fn add_cluster_member(
    State(state): State<Arc<dyn OrchestratorHandle>>,
    Json(body): Json<ClusterMemberLocal>,
) -> impl IntoResponse {
    let remote = Remote {
        name: body.name,
        address: body.address,
        certificate: body.certificate,
    };
    match state.add_trust_store_entry(remote).await {
        Ok(()) => Envelope::sync(StatusCode::OK, json!({})),
        Err(e) => Envelope::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `PATCH /1.0/internal/database` — no body; `X-Dqlite-Version` header.
/// Informational: always 200 once the header parses.
async fn notify_database_upgrade(
    State(state): State<Arc<dyn OrchestratorHandle>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let version = headers
        .get("X-Dqlite-Version")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let Some(version) = version else {
        return Envelope::error(StatusCode::BAD_REQUEST, "missing or invalid X-Dqlite-Version");
    };
    state.record_upgrade_notification(version);
    Envelope::sync(StatusCode::OK, json!({}))
}

/// `POST /1.0/internal/hooks/newmember` — triggers the local `OnNewMember`
/// hook; 503 if this node is still joining.
async fn run_new_member_hook(
    State(state): State<Arc<dyn OrchestratorHandle>>,
    Json(body): Json<HookNewMemberOptions>,
) -> impl IntoResponse {
    if state.is_still_joining() {
        return Envelope::error(StatusCode::SERVICE_UNAVAILABLE, "still joining");
    }
    state.dispatch_on_new_member(body.name).await;
    Envelope::sync(StatusCode::OK, json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests_support::RecordingHandle;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn cluster_post_inserts_member_via_handle() {
        let handle: Arc<dyn OrchestratorHandle> = Arc::new(RecordingHandle::default());
        let router = internal_router(handle.clone());
        let body = json!({"name": "beta", "address": "beta:7000", "certificate": [1, 2, 3]});
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/1.0/internal/cluster")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn database_patch_requires_version_header() {
        let handle: Arc<dyn OrchestratorHandle> = Arc::new(RecordingHandle::default());
        let router = internal_router(handle);
        let response = router
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/1.0/internal/database")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn new_member_hook_returns_503_while_joining() {
        let handle = Arc::new(RecordingHandle::default());
        handle.set_still_joining(true);
        let handle: Arc<dyn OrchestratorHandle> = handle;
        let router = internal_router(handle);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/1.0/internal/hooks/newmember")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"name": "beta"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
