use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    #[serde(default)]
    pub location: FileLocationConfig,
    #[serde(default)]
    pub jobs: FileJobsConfig,
    pub dev_mode: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_key: Option<String>,
    /// Human-readable duration, e.g. `"12h"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ttl: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLocationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_idle_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileJobsConfig {
    /// `deny`, `customer` or `either`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress_cancellation: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub cors_allowed_methods: Option<Vec<String>>,
    pub cors_allowed_headers: Option<Vec<String>>,
    pub cors_allow_credentials: Option<bool>,
    pub auth_token_key: Option<String>,
    pub auth_session_ttl: Option<String>,
    pub location_code_ttl: Option<String>,
    pub location_token_ttl: Option<String>,
    pub travel_idle_timeout: Option<String>,
    pub room_capacity: Option<usize>,
    pub sweep_interval: Option<String>,
    pub in_progress_cancellation: Option<String>,
    pub dev_mode: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; `gather` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let csv = |name: &str| lookup(name).map(|raw| split_csv(&raw));
        let flag = |name: &str| lookup(name).and_then(|raw| parse_bool(&raw));

        Self {
            config_path: lookup("CONFIG_PATH").map(PathBuf::from),
            server_host: lookup("SERVER_HOST"),
            server_port: parse_var(&lookup, "SERVER_PORT"),
            database_url: lookup("DATABASE_URL"),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS"),
            cors_allowed_origins: csv("CORS_ALLOWED_ORIGINS"),
            cors_allowed_methods: csv("CORS_ALLOWED_METHODS"),
            cors_allowed_headers: csv("CORS_ALLOWED_HEADERS"),
            cors_allow_credentials: flag("CORS_ALLOW_CREDENTIALS"),
            auth_token_key: lookup("AUTH_TOKEN_KEY"),
            auth_session_ttl: lookup("AUTH_SESSION_TTL"),
            location_code_ttl: lookup("LOCATION_CODE_TTL"),
            location_token_ttl: lookup("LOCATION_TOKEN_TTL"),
            travel_idle_timeout: lookup("TRAVEL_IDLE_TIMEOUT"),
            room_capacity: parse_var(&lookup, "ROOM_CAPACITY"),
            sweep_interval: lookup("SWEEP_INTERVAL"),
            in_progress_cancellation: lookup("IN_PROGRESS_CANCELLATION"),
            dev_mode: flag("DEV_MODE"),
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|raw| raw.trim().parse().ok())
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn csv_and_flags_are_parsed() {
        let env = env(&[
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("DEV_MODE", "Yes"),
            ("CORS_ALLOW_CREDENTIALS", "maybe"),
            ("SERVER_PORT", " 8080 "),
        ]);
        assert_eq!(
            env.cors_allowed_origins.as_deref(),
            Some(&["https://a.example".to_string(), "https://b.example".to_string()][..])
        );
        assert_eq!(env.dev_mode, Some(true));
        assert_eq!(env.cors_allow_credentials, None);
        assert_eq!(env.server_port, Some(8080));
    }

    #[test]
    fn unparsable_numbers_are_ignored() {
        let env = env(&[("ROOM_CAPACITY", "lots")]);
        assert_eq!(env.room_capacity, None);
    }
}
