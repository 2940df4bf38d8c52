//! Shared bearer token obtained through the OAuth2 client-credentials grant.
//!
//! # Overview
//!
//! - [`ClientCredentialsConfig`] - Token endpoint, client identity and timing
//! - [`CredentialManager`] - Holds the current token and refreshes it ahead of expiry
//!
//! Reads of the current token take a shared lock. Refreshes go through a
//! single async mutex, so callers that queue behind an in-flight exchange
//! reuse its token instead of issuing their own.
//!
//! # Example
//!
//! ```ignore
//! use cptlookup_auth::{ClientCredentialsConfig, CredentialManager};
//!
//! let config = ClientCredentialsConfig::new(token_url, "client-id", "secret");
//! let manager = CredentialManager::connect(config).await?;
//! let header = manager.acquire().await?; // "Bearer <token>"
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::error::CredentialError;

/// Configuration for the client-credentials exchange.
#[derive(Clone)]
pub struct ClientCredentialsConfig {
    /// Token endpoint.
    pub token_url: Url,

    pub client_id: String,

    pub client_secret: String,

    /// A token is refreshed once its remaining lifetime drops to this
    /// value (default: 30 seconds).
    pub refresh_buffer: Duration,

    /// HTTP request timeout (default: 4 seconds).
    pub request_timeout: Duration,
}

impl ClientCredentialsConfig {
    /// Default refresh buffer.
    pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(30);

    /// Default HTTP timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(4000);

    /// Creates a configuration with default timing.
    #[must_use]
    pub fn new(
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_buffer: Self::DEFAULT_REFRESH_BUFFER,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the refresh buffer.
    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .field("refresh_buffer", &self.refresh_buffer)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Successful response of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Lifetime in seconds.
    pub expires_in: u64,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

struct TokenState {
    access_token: String,
    expires_at: Instant,
    /// Bumped on every successful exchange.
    generation: u64,
}

/// Owner of the process-wide upstream bearer token.
pub struct CredentialManager {
    http_client: reqwest::Client,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
    config: ClientCredentialsConfig,
}

impl CredentialManager {
    /// Builds the manager and performs the initial exchange.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built or the first exchange fails.
    /// A manager never exists without a token.
    pub async fn connect(config: ClientCredentialsConfig) -> Result<Self, CredentialError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CredentialError::Config(e.to_string()))?;

        let manager = Self {
            http_client,
            state: RwLock::new(TokenState {
                access_token: String::new(),
                expires_at: Instant::now(),
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
            config,
        };

        manager.refresh().await?;
        Ok(manager)
    }

    /// Returns an `Authorization` header value for the current token.
    ///
    /// Refreshes first when the remaining lifetime is within the buffer.
    pub async fn acquire(&self) -> Result<String, CredentialError> {
        let seen_generation = {
            let state = self.state.read().await;
            if !self.needs_refresh(&state) {
                return Ok(bearer(&state.access_token));
            }
            state.generation
        };

        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            if state.generation != seen_generation || !self.needs_refresh(&state) {
                tracing::debug!("Reusing token refreshed by a concurrent caller");
                return Ok(bearer(&state.access_token));
            }
        }

        let token = self.exchange().await?;
        Ok(bearer(&self.store(token).await))
    }

    /// Performs a client-credentials exchange unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The token endpoint cannot be reached
    /// - It answers with a non-200 status
    /// - The body is not a valid token response
    pub async fn refresh(&self) -> Result<(), CredentialError> {
        let _guard = self.refresh_lock.lock().await;
        let token = self.exchange().await?;
        self.store(token).await;
        Ok(())
    }

    /// Time left before the current token expires.
    pub async fn remaining_lifetime(&self) -> Duration {
        let state = self.state.read().await;
        state.expires_at.saturating_duration_since(Instant::now())
    }

    fn needs_refresh(&self, state: &TokenState) -> bool {
        state.expires_at.saturating_duration_since(Instant::now()) <= self.config.refresh_buffer
    }

    async fn exchange(&self) -> Result<TokenResponse, CredentialError> {
        tracing::debug!("Requesting token from {}", self.config.token_url);

        let response = self
            .http_client
            .post(self.config.token_url.as_str())
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to reach token endpoint {}: {}", self.config.token_url, e);
                CredentialError::NetworkError(e.to_string())
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CredentialError::ParseError(e.to_string()))
    }

    async fn store(&self, token: TokenResponse) -> String {
        let lifetime = Duration::from_secs(token.expires_in);
        if lifetime <= self.config.refresh_buffer {
            tracing::warn!(
                expires_in = token.expires_in,
                buffer_secs = self.config.refresh_buffer.as_secs(),
                "Token lifetime does not exceed the refresh buffer"
            );
        }

        let mut state = self.state.write().await;
        state.access_token = token.access_token;
        state.expires_at = Instant::now() + lifetime;
        state.generation += 1;

        tracing::info!(
            expires_in_secs = token.expires_in,
            "Token refreshed successfully"
        );

        state.access_token.clone()
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
