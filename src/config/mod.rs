use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use url::Url;

pub const DEFAULT_UPSTREAM_URI: &str = "http://localhost:9200";
pub const DEFAULT_IDENTITY_HEADER: &str = "OIDC_CLAIM_preferred_username";
pub const DEFAULT_OWNER_FIELD: &str = "owner";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub upstream: UpstreamConfig,
    pub identity: IdentityConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "production" | "prod" => Some(Environment::Production),
            "staging" | "stage" => Some(Environment::Staging),
            "development" | "dev" => Some(Environment::Development),
            _ => None,
        }
    }

    /// Log level used when `RUST_LOG` is not set
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Staging | Environment::Production => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub uri: Url,
    /// Per-request timeout; `None` keeps the HTTP client's default.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Trusted header populated by the authentication layer in front of the proxy
    pub header: String,
    /// Document attribute naming the owner(s)
    pub owner_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
    pub bulk_passthrough: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid upstream URI '{value}': {reason}")]
    InvalidUpstreamUri { value: String, reason: String },

    #[error("Invalid identity header name: {0}")]
    InvalidIdentityHeader(String),

    #[error("Owner field must not be empty")]
    EmptyOwnerField,

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Invalid upstream timeout '{0}': expected a positive number of milliseconds")]
    InvalidTimeout(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV") {
            Ok(v) => Environment::parse(&v).ok_or(ConfigError::UnknownEnvironment(v))?,
            Err(_) => Environment::Development,
        };

        Self::from_env_as(environment)
    }

    /// Presets for `environment`, then overrides from the process environment.
    pub fn from_env_as(environment: Environment) -> Result<Self, ConfigError> {
        // Set defaults based on environment, then override with specific env vars
        let config = Self::for_environment(environment).with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        // Upstream overrides
        if let Ok(v) = env::var("UPSTREAM_URI") {
            self.upstream.uri = parse_upstream_uri(&v)?;
        }
        if let Ok(v) = env::var("UPSTREAM_TIMEOUT_MS") {
            self.upstream.timeout_ms = Some(parse_timeout_ms(&v)?);
        }

        // Identity overrides
        if let Ok(v) = env::var("IDENTITY_HEADER") {
            self.identity.header = v;
        }
        if let Ok(v) = env::var("OWNER_FIELD") {
            self.identity.owner_field = v;
        }

        // API overrides
        if let Ok(v) = env::var("API_BIND") {
            self.api.bind = v;
        }
        if let Some(port) = env::var("API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_BULK_PASSTHROUGH") {
            self.api.bulk_passthrough = v.parse().unwrap_or(self.api.bulk_passthrough);
        }

        Ok(self)
    }

    /// Reject settings the proxy cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        HeaderName::from_bytes(self.identity.header.as_bytes())
            .map_err(|_| ConfigError::InvalidIdentityHeader(self.identity.header.clone()))?;

        if self.identity.owner_field.trim().is_empty() {
            return Err(ConfigError::EmptyOwnerField);
        }

        if self.upstream.uri.cannot_be_a_base() {
            return Err(ConfigError::InvalidUpstreamUri {
                value: self.upstream.uri.to_string(),
                reason: "not a base URI".to_string(),
            });
        }

        Ok(())
    }

    /// Address string for the listener, e.g. `0.0.0.0:4000`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api.bind, self.api.port)
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            upstream: UpstreamConfig::default(),
            identity: IdentityConfig::default(),
            api: ApiConfig {
                bind: "127.0.0.1".to_string(),
                port: 4000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                bulk_passthrough: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            upstream: UpstreamConfig::default(),
            identity: IdentityConfig::default(),
            api: ApiConfig {
                bind: "0.0.0.0".to_string(),
                port: 4000,
                enable_request_logging: true,
                max_request_size_bytes: 50 * 1024 * 1024, // 50MB
                bulk_passthrough: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            upstream: UpstreamConfig::default(),
            identity: IdentityConfig::default(),
            api: ApiConfig {
                bind: "0.0.0.0".to_string(),
                port: 4000,
                enable_request_logging: false,
                max_request_size_bytes: 100 * 1024 * 1024, // 100MB, bulk payloads
                bulk_passthrough: true,
            },
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            uri: Url::parse(DEFAULT_UPSTREAM_URI).expect("default upstream URI is valid"),
            timeout_ms: None,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_IDENTITY_HEADER.to_string(),
            owner_field: DEFAULT_OWNER_FIELD.to_string(),
        }
    }
}

pub fn parse_timeout_ms(value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidTimeout(value.to_string())),
    }
}

pub fn parse_upstream_uri(value: &str) -> Result<Url, ConfigError> {
    let uri = Url::parse(value).map_err(|e| ConfigError::InvalidUpstreamUri {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    match uri.scheme() {
        "http" | "https" => Ok(uri),
        other => Err(ConfigError::InvalidUpstreamUri {
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
