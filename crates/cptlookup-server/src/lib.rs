pub mod config;
pub mod error;
pub mod gold_card;
pub mod handlers;
pub mod import;
pub mod middleware;
pub mod observability;
pub mod orchestrator;
pub mod server;
pub mod upstream;

pub use config::{AppConfig, CacheConfig, ConfigError, ServerConfig, UpstreamConfig};
pub use error::LookupError;
pub use gold_card::GoldCardAnnotator;
pub use import::{ImportError, ImportSummary, import_codes, read_codes};
pub use observability::init_tracing;
pub use orchestrator::{LookupOrchestrator, LookupOutcome};
pub use server::{AppState, CptLookupServer, ServerBuilder, StartupError, build_app};
pub use upstream::{UpstreamClient, UpstreamError, UpstreamResponse};
