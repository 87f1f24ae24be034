// src/endpoint/router.rs

//! Builds the base HTTP router shared by every endpoint.
//!
//! Matching happens against the raw, still-percent-encoded request path —
//! axum's router (unlike `Path<String>` extraction) never decodes it before
//! matching, so nested embedder routers see `%2Fitem` verbatim as long as
//! they extract with [`axum::extract::RawPathParams`] or read
//! `request.uri().path()` directly rather than a decoding extractor.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::json;

use super::response::{Envelope, not_found};

/// Shared state every handler mounted on the core router can reach.
/// Intentionally minimal; the orchestrator's own internal API mounts its
/// handlers with additional state via `.with_state` on a nested router.
#[derive(Clone, Default)]
pub struct RouterState;

/// The core router every endpoint starts from: root API-version listing and
/// a JSON 404 fallback. Callers `.merge` or `.nest` their own resource
/// routers on top.
pub fn base_router() -> Router {
    Router::new()
        .route("/", get(list_api_versions))
        .fallback(not_found)
        .with_state(RouterState)
}

async fn list_api_versions(State(_): State<RouterState>) -> Envelope {
    Envelope::sync(StatusCode::OK, json!(["/1.0"]))
}
