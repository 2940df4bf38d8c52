//! Lookup request flow: token, upstream call, cache write or fallback.

use std::sync::Arc;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use cptlookup_auth::CredentialManager;
use cptlookup_core::{DecisionResponse, LookupRequest};
use cptlookup_storage::DynDecisionStore;

use crate::error::LookupError;
use crate::gold_card::GoldCardAnnotator;
use crate::upstream::{UpstreamClient, UpstreamError, UpstreamResponse};

/// How a lookup was answered.
#[derive(Debug)]
pub enum LookupOutcome {
    /// Parsed upstream answer, cached and returned as received.
    Fresh(DecisionResponse),
    /// Cached answer with gold-card flags and the disclaimer.
    Fallback(DecisionResponse),
    /// Upstream bytes forwarded untouched.
    Passthrough { status: StatusCode, body: Bytes },
}

impl LookupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh(_) => "fresh",
            Self::Fallback(_) => "fallback",
            Self::Passthrough { .. } => "passthrough",
        }
    }
}

impl IntoResponse for LookupOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Fresh(decision) | Self::Fallback(decision) => {
                (StatusCode::OK, Json(decision)).into_response()
            }
            Self::Passthrough { status, body } => (
                status,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                body,
            )
                .into_response(),
        }
    }
}

pub struct LookupOrchestrator {
    credentials: Arc<CredentialManager>,
    upstream: UpstreamClient,
    decisions: DynDecisionStore,
    annotator: GoldCardAnnotator,
}

impl LookupOrchestrator {
    pub fn new(
        credentials: Arc<CredentialManager>,
        upstream: UpstreamClient,
        decisions: DynDecisionStore,
        annotator: GoldCardAnnotator,
    ) -> Self {
        Self {
            credentials,
            upstream,
            decisions,
            annotator,
        }
    }

    /// Handles a raw `POST /api` body.
    pub async fn handle(&self, body: &[u8]) -> Result<LookupOutcome, LookupError> {
        let request = LookupRequest::from_slice(body)?;
        self.lookup(&request).await
    }

    #[tracing::instrument(skip_all, fields(state = %request.policy_issue_state, codes = request.procedure_codes.len()))]
    pub async fn lookup(&self, request: &LookupRequest) -> Result<LookupOutcome, LookupError> {
        let bearer = self.credentials.acquire().await.map_err(|e| {
            tracing::error!(error = %e, "token acquisition failed");
            LookupError::Credential(e)
        })?;

        let outcome = match self
            .upstream
            .lookup(&bearer, &request.policy_issue_state, &request.procedure_codes)
            .await
        {
            Ok(response) => self.on_upstream_response(request, response).await,
            Err(UpstreamError::Transport(detail)) => {
                tracing::warn!(error = %detail, "upstream unreachable, trying local data");
                self.fallback(request)
                    .await
                    .map(LookupOutcome::Fallback)
                    .ok_or(LookupError::UpstreamUnavailable(detail))?
            }
            Err(e @ UpstreamError::Config(_)) => {
                return Err(LookupError::UpstreamUnavailable(e.to_string()));
            }
        };

        tracing::info!(outcome = outcome.label(), "lookup answered");
        Ok(outcome)
    }

    async fn on_upstream_response(
        &self,
        request: &LookupRequest,
        response: UpstreamResponse,
    ) -> LookupOutcome {
        let UpstreamResponse { status, body } = response;

        if status == StatusCode::OK {
            return match serde_json::from_slice::<DecisionResponse>(&body) {
                Ok(decision) => {
                    self.store(&decision).await;
                    LookupOutcome::Fresh(decision)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "upstream body did not parse, passing through");
                    LookupOutcome::Passthrough { status, body }
                }
            };
        }

        if status.is_success() {
            return LookupOutcome::Passthrough { status, body };
        }

        tracing::warn!(status = status.as_u16(), "upstream returned an error, trying local data");
        match self.fallback(request).await {
            Some(decision) => LookupOutcome::Fallback(decision),
            None => LookupOutcome::Passthrough { status, body },
        }
    }

    async fn store(&self, decision: &DecisionResponse) {
        match self.decisions.upsert(decision).await {
            Ok(outcome) => {
                tracing::debug!(key = %decision.key(), outcome = %outcome, "decision cached");
            }
            Err(e) => {
                tracing::error!(key = %decision.key(), error = %e, "failed to cache decision");
            }
        }
    }

    /// Cached answer for the request, if any. Read errors count as a miss.
    async fn fallback(&self, request: &LookupRequest) -> Option<DecisionResponse> {
        let mut decision = match self
            .decisions
            .get(&request.policy_issue_state, &request.procedure_codes)
            .await
        {
            Ok(decision) => decision,
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "no local data");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "local read failed, treating as miss");
                return None;
            }
        };

        self.annotator.annotate(&mut decision).await;
        decision.apply_disclaimer();
        Some(decision)
    }
}
