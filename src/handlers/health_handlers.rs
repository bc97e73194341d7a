//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks SQLite and disk I/O of the local store

use crate::store::{LocalObjectStore, local::Probe};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /healthz`
///
/// Liveness probe. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// HTTP 200 when the metadata database answers and the payload directory
/// accepts a write/read/delete cycle, HTTP 503 otherwise.
pub async fn readyz(State(store): State<LocalObjectStore>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", store.probe_database().await);
    checks.insert("disk", store.probe_disk().await);

    let ready = checks.values().all(|probe| probe.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, Probe>,
}
