use std::sync::Arc;

use async_trait::async_trait;
use cptlookup_auth::CredentialManager;
use cptlookup_core::DecisionResponse;
use cptlookup_db_memory::InMemoryStorage;
use cptlookup_server::{
    AppConfig, AppState, GoldCardAnnotator, LookupOrchestrator, UpstreamClient, build_app,
};
use cptlookup_storage::{DecisionStore, DynDecisionStore, StorageError, UpsertOutcome};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn start_server(
    decisions: DynDecisionStore,
) -> (String, MockServer, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let tokens = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "t",
            "expires_in": 3600
        })))
        .mount(&tokens)
        .await;

    let mut cfg = AppConfig::default();
    cfg.upstream.token_url = format!("{}/token", tokens.uri());
    cfg.upstream.lookup_url = format!("{}/lookup", tokens.uri());
    cfg.upstream.client_id = "client".into();
    cfg.upstream.client_secret = "secret".into();
    cfg.upstream.x_identity = "tenant-1".into();

    let credentials = CredentialManager::connect(cfg.credentials().unwrap())
        .await
        .expect("token");
    let orchestrator = LookupOrchestrator::new(
        Arc::new(credentials),
        UpstreamClient::new(&cfg.upstream).unwrap(),
        decisions.clone(),
        GoldCardAnnotator::new(Arc::new(InMemoryStorage::new())),
    );
    let app = build_app(
        AppState {
            orchestrator: Arc::new(orchestrator),
            decisions,
        },
        &cfg.server,
    );

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tokens, tx, server)
}

#[tokio::test]
async fn server_endpoints_work() {
    let (base, _tokens, shutdown_tx, handle) =
        start_server(Arc::new(InMemoryStorage::new())).await;
    let client = reqwest::Client::new();

    // GET /
    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "CPT Lookup Proxy");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // GET /readyz
    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["backend"], "memory");

    // Unknown route
    let resp = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn request_id_is_preserved_or_generated() {
    let (base, _tokens, shutdown_tx, handle) =
        start_server(Arc::new(InMemoryStorage::new())).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/healthz"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    let generated = resp.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&generated).is_ok());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

/// Decision store that is never reachable.
struct DownStore;

#[async_trait]
impl DecisionStore for DownStore {
    async fn get(
        &self,
        policy_issue_state: &str,
        _procedure_codes: &[String],
    ) -> Result<DecisionResponse, StorageError> {
        Err(StorageError::no_record(policy_issue_state))
    }

    async fn upsert_at(
        &self,
        _response: &DecisionResponse,
        _now: OffsetDateTime,
    ) -> Result<UpsertOutcome, StorageError> {
        Err(StorageError::connection_error("down"))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Err(StorageError::connection_error("pool timed out"))
    }

    fn backend_name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn readyz_reports_unavailable_store() {
    let (base, _tokens, shutdown_tx, handle) = start_server(Arc::new(DownStore)).await;

    let resp = reqwest::get(format!("{base}/readyz")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "unavailable");
    assert!(body["detail"].as_str().unwrap().contains("pool timed out"));

    // Liveness is unaffected.
    let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert!(resp.status().is_success());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
