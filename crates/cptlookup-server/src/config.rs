use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use cptlookup_auth::ClientCredentialsConfig;
use cptlookup_db_postgres::PostgresConfig;
use cptlookup_storage::StalenessWindow;
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(String),

    #[error("config deserialize error: {0}")]
    Deserialize(String),

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token and decision-lookup endpoints
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Server validations
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port must be > 0"));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigError::invalid("server.body_limit_bytes must be > 0"));
        }
        self.validate_storage()?;
        // Upstream validation
        let up = &self.upstream;
        for (key, value) in [
            ("upstream.token_url", &up.token_url),
            ("upstream.lookup_url", &up.lookup_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::invalid(format!("{key} is invalid: {e}")))?;
        }
        for (key, value, legacy) in [
            ("upstream.client_id", &up.client_id, Some("CLIENT_ID")),
            ("upstream.client_secret", &up.client_secret, Some("CLIENT_SECRET")),
            ("upstream.x_identity", &up.x_identity, Some("X_IDENTITY")),
            ("upstream.product_category", &up.product_category, None),
            ("upstream.tin", &up.tin, None),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(match legacy {
                    Some(var) => format!("{key} is required (or set {var})"),
                    None => format!("{key} is required"),
                }));
            }
        }
        if up.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("upstream.request_timeout_ms must be > 0"));
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }

    /// Checks only what is needed to open the database.
    pub fn validate_storage(&self) -> Result<(), ConfigError> {
        let pg = &self.storage.postgres;
        if pg.url.trim().is_empty() {
            return Err(ConfigError::invalid(
                "storage.postgres.url is required (or set DATABASE_URL)",
            ));
        }
        if pg.pool_size == 0 {
            return Err(ConfigError::invalid("storage.postgres.pool_size must be > 0"));
        }
        if self.cache.staleness_window_hours == 0 {
            return Err(ConfigError::invalid("cache.staleness_window_hours must be > 0"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn staleness_window(&self) -> StalenessWindow {
        StalenessWindow::from_hours(self.cache.staleness_window_hours)
    }

    /// Builds the token-manager settings from the upstream section.
    pub fn credentials(&self) -> Result<ClientCredentialsConfig, ConfigError> {
        let up = &self.upstream;
        let token_url = Url::parse(&up.token_url)
            .map_err(|e| ConfigError::invalid(format!("upstream.token_url is invalid: {e}")))?;
        Ok(
            ClientCredentialsConfig::new(token_url, &up.client_id, &up.client_secret)
                .with_refresh_buffer(Duration::from_secs(up.token_refresh_buffer_secs))
                .with_request_timeout(up.request_timeout()),
        )
    }

    /// Applies the flat variables older deployments set directly.
    ///
    /// These win over both the file and `CPTLOOKUP__*` variables.
    pub fn apply_legacy_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("CLIENT_ID") {
            self.upstream.client_id = v;
        }
        if let Some(v) = non_empty("CLIENT_SECRET") {
            self.upstream.client_secret = v;
        }
        if let Some(v) = non_empty("X_IDENTITY") {
            self.upstream.x_identity = v;
        }
        if let Some(v) = non_empty("DATABASE_URL") {
            self.storage.postgres.url = v;
        }
        if let Some(v) = non_empty("PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(format!("PORT is not a valid port: {v}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// OAuth2 token endpoint
    #[serde(default)]
    pub token_url: String,
    /// Decision-lookup endpoint
    #[serde(default)]
    pub lookup_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Value of the `X-Identity` header
    #[serde(default)]
    pub x_identity: String,
    #[serde(default)]
    pub product_category: String,
    /// Tax id sent with every lookup
    #[serde(default)]
    pub tin: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_token_refresh_buffer_secs")]
    pub token_refresh_buffer_secs: u64,
}

fn default_request_timeout_ms() -> u64 {
    4000
}
fn default_token_refresh_buffer_secs() -> u64 {
    30
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            lookup_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            x_identity: String::new(),
            product_category: String::new(),
            tin: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            token_refresh_buffer_secs: default_token_refresh_buffer_secs(),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("token_url", &self.token_url)
            .field("lookup_url", &self.lookup_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .field("x_identity", &self.x_identity)
            .field("product_category", &self.product_category)
            .field("tin", &self.tin)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("token_refresh_buffer_secs", &self.token_refresh_buffer_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Records older than this are reset instead of appended to
    #[serde(default = "default_staleness_window_hours")]
    pub staleness_window_hours: u32,
}

fn default_staleness_window_hours() -> u32 {
    StalenessWindow::DEFAULT_HOURS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            staleness_window_hours: default_staleness_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File, FileFormat};
    use std::path::PathBuf;

    /// Default configuration file, used when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "cptlookup.toml";

    /// Loads configuration from the file, `CPTLOOKUP__*` variables and the
    /// legacy flat variables, then validates it.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        load_config_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`load_config`] with an explicit lookup for legacy variables.
    pub fn load_config_with_env<F>(path: Option<&str>, legacy_env: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let merged = merge(path, legacy_env)?;
        merged.validate()?;
        Ok(merged)
    }

    /// Loads configuration for tools that only talk to the database.
    ///
    /// Upstream settings may be absent.
    pub fn load_storage_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        let merged = merge(path, |key| std::env::var(key).ok())?;
        merged.validate_storage()?;
        Ok(merged)
    }

    fn merge<F>(path: Option<&str>, legacy_env: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        }
        // CPTLOOKUP__SERVER__PORT=9090 style overrides. Values stay strings
        // until deserialized so ids like `tin = "012345678"` keep leading zeros.
        builder = builder.add_source(Environment::with_prefix("CPTLOOKUP").separator("__"));
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Build(e.to_string()))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        merged.apply_legacy_env(legacy_env)?;
        Ok(merged)
    }
}
