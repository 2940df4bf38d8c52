use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;

use crate::error::LookupError;
use crate::orchestrator::LookupOutcome;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "CPT Lookup Proxy",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            backend: None,
            detail: None,
        }),
    )
}

/// Ready once the decision store answers.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let backend = Some(state.decisions.backend_name());
    match state.decisions.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                backend,
                detail: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    backend,
                    detail: Some(e.to_string()),
                }),
            )
        }
    }
}

/// `POST /api`
pub async fn lookup(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<LookupOutcome, LookupError> {
    state.orchestrator.handle(&body).await
}
