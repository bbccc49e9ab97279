use std::{path::PathBuf, time::Duration as StdDuration};

use chrono::Duration;
use crewlink_core::domain::{CancellationPolicy, ShareLifetimes};

/// Placeholder HMAC key used when `AUTH_TOKEN_KEY` is not provided.
pub const DEFAULT_TOKEN_KEY: &str = "crewlink-insecure-development-token-key";

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub location: LocationConfig,
    pub jobs: JobsConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn uses_database(&self) -> bool {
        self.database.url.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin.trim() == "*")
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: vec![
                "Authorization".to_string(),
                "Content-Type".to_string(),
            ],
            allow_credentials: false,
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    /// Keys every code, token, phone and session digest.
    pub token_key: String,
    pub session_ttl: Duration,
}

impl AuthConfig {
    pub fn is_default_token_key(&self) -> bool {
        self.token_key == DEFAULT_TOKEN_KEY
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_key", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            session_ttl: Duration::hours(12),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub code_ttl: Duration,
    pub token_ttl: Duration,
    pub travel_idle_timeout: Duration,
    /// Buffered events per room before slow receivers start lagging.
    pub room_capacity: usize,
    /// How often idle travel sessions and expired credentials are swept.
    pub sweep_interval: StdDuration,
}

impl LocationConfig {
    pub fn share_lifetimes(&self) -> ShareLifetimes {
        ShareLifetimes {
            code_ttl: self.code_ttl,
            token_ttl: self.token_ttl,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        let lifetimes = ShareLifetimes::default();
        Self {
            code_ttl: lifetimes.code_ttl,
            token_ttl: lifetimes.token_ttl,
            travel_idle_timeout: Duration::minutes(15),
            room_capacity: 256,
            sweep_interval: StdDuration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobsConfig {
    pub in_progress_cancellation: CancellationPolicy,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
