//! Client for the upstream decision-lookup endpoint.

use axum::http::{HeaderValue, StatusCode, header};
use bytes::Bytes;
use url::Url;

use cptlookup_core::UpstreamLookupBody;

use crate::config::UpstreamConfig;

pub const X_IDENTITY_HEADER: &str = "x-identity";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The call did not produce a complete response (timeout, connect
    /// failure, truncated body).
    #[error("{0}")]
    Transport(String),

    #[error("invalid upstream configuration: {0}")]
    Config(String),
}

/// Raw upstream answer. Non-2xx statuses are returned here, not as errors.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Issues decision lookups with the deployment's fixed identity.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http_client: reqwest::Client,
    lookup_url: Url,
    x_identity: HeaderValue,
    product_category: String,
    tin: String,
}

impl UpstreamClient {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Fails when the tenant identity is missing or not a valid header
    /// value, the lookup URL does not parse, or the HTTP client cannot be
    /// built.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        if config.x_identity.trim().is_empty() {
            return Err(UpstreamError::Config("x_identity is required".into()));
        }
        let x_identity = HeaderValue::from_str(&config.x_identity)
            .map_err(|e| UpstreamError::Config(format!("x_identity: {e}")))?;
        let lookup_url = Url::parse(&config.lookup_url)
            .map_err(|e| UpstreamError::Config(format!("lookup_url: {e}")))?;
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| UpstreamError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            lookup_url,
            x_identity,
            product_category: config.product_category.clone(),
            tin: config.tin.clone(),
        })
    }

    /// Posts one lookup. No retry; the first failure is returned.
    #[tracing::instrument(skip(self, bearer), fields(url = %self.lookup_url))]
    pub async fn lookup(
        &self,
        bearer: &str,
        policy_issue_state: &str,
        procedure_codes: &[String],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let body = UpstreamLookupBody {
            product_category: &self.product_category,
            policy_issue_state,
            procedure_code: procedure_codes,
            tin: &self.tin,
        };

        let response = self
            .http_client
            .post(self.lookup_url.clone())
            .header(header::AUTHORIZATION, bearer)
            .header(X_IDENTITY_HEADER, self.x_identity.clone())
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            UpstreamError::Transport(format!("Failed to read upstream response: {e}"))
        })?;

        tracing::debug!(status = status.as_u16(), bytes = body.len(), "upstream responded");
        Ok(UpstreamResponse { status, body })
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Transport(format!("Upstream request timed out: {e}"))
    } else if e.is_connect() {
        UpstreamError::Transport(format!("Failed to connect to upstream: {e}"))
    } else {
        UpstreamError::Transport(format!("Upstream request failed: {e}"))
    }
}
