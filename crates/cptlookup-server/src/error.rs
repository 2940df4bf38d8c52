//! Errors that end a lookup request.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use cptlookup_auth::CredentialError;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Malformed inbound body.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No usable bearer token. Never falls back to the cache.
    #[error("Failed to get authentication token")]
    Credential(#[source] CredentialError),

    /// Upstream unreachable and nothing cached.
    #[error("Upstream service unavailable")]
    UpstreamUnavailable(String),
}

impl LookupError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Text placed in the response body. Token endpoint errors stay in the
    /// logs; callers only see the generic message.
    fn detail(&self) -> String {
        match self {
            Self::InvalidRequest(detail) | Self::UpstreamUnavailable(detail) => detail.clone(),
            Self::Credential(_) => String::new(),
        }
    }
}

impl From<cptlookup_core::CoreError> for LookupError {
    fn from(e: cptlookup_core::CoreError) -> Self {
        match e {
            cptlookup_core::CoreError::InvalidRequest { message } => Self::InvalidRequest(message),
        }
    }
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            Self::InvalidRequest(_) => "Invalid request".to_string(),
            other => other.to_string(),
        };

        let mut body = Map::new();
        body.insert("error".into(), Value::String(error));
        let detail = self.detail();
        if !detail.is_empty() {
            body.insert("detail".into(), Value::String(detail));
        }
        (status, Json(Value::Object(body))).into_response()
    }
}
