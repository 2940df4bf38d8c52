use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use cptlookup_auth::{CredentialError, CredentialManager};
use cptlookup_db_postgres::PostgresStorage;
use cptlookup_storage::{DynDecisionStore, StorageError};

use crate::config::{AppConfig, ConfigError, ServerConfig};
use crate::gold_card::GoldCardAnnotator;
use crate::orchestrator::LookupOrchestrator;
use crate::upstream::{UpstreamClient, UpstreamError};
use crate::{handlers, middleware as app_middleware};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LookupOrchestrator>,
    pub decisions: DynDecisionStore,
}

/// Failures while wiring the server together. All are fatal.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("initial token fetch failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

pub struct CptLookupServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(state: AppState, cfg: &ServerConfig) -> Router {
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/api", post(handlers::lookup))
        .with_state(state)
        // Middleware stack (outermost last: request id -> trace -> body limit)
        .layer(axum::extract::DefaultBodyLimit::max(cfg.body_limit_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects storage, fetches the first token and builds the router.
    ///
    /// Blocks until the token endpoint answers; the server never starts
    /// without a token.
    pub async fn build(self) -> Result<CptLookupServer, StartupError> {
        let cfg = self.config;
        cfg.validate()?;

        let storage = Arc::new(
            PostgresStorage::new(cfg.storage.postgres.clone(), cfg.staleness_window()).await?,
        );
        tracing::info!(backend = "postgres", "storage ready");

        let credentials = Arc::new(CredentialManager::connect(cfg.credentials()?).await?);
        let upstream = UpstreamClient::new(&cfg.upstream)?;

        let decisions: DynDecisionStore = storage.clone();
        let orchestrator = LookupOrchestrator::new(
            credentials,
            upstream,
            decisions.clone(),
            GoldCardAnnotator::new(storage),
        );
        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            decisions,
        };

        Ok(CptLookupServer {
            addr: self.addr,
            app: build_app(state, &cfg.server),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CptLookupServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
