use once_cell::sync::Lazy;
use std::{
    fs,
    path::PathBuf,
    time::Duration as StdDuration,
};
use thiserror::Error;

use super::{
    models::{
        AuthConfig, Config, ConfigMetadata, CorsConfig, DatabaseConfig,
        JobsConfig, LocationConfig, ServerConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("crewlink.toml"),
        PathBuf::from("config/crewlink.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Compose from an already gathered environment.
    pub fn load_with_env(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env_config)?;
        let config_present = file_config.is_some();

        let (config, warnings) = compose_config(
            file_config,
            env_config,
            config_path,
            env_file_loaded,
            config_present,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(found) => found.clone(),
                None => return Ok((None, None)),
            },
        };

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
    config_present: bool,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if !config_present {
        warnings.push_with_hint(
            "No crewlink.toml detected; falling back to environment variables",
            "Create crewlink.toml or point CONFIG_PATH at a configuration file",
        );
    }

    let FileConfig {
        server: file_server,
        database: file_database,
        cors: file_cors,
        auth: file_auth,
        location: file_location,
        jobs: file_jobs,
        dev_mode: file_dev_mode,
    } = file_config.unwrap_or_default();

    let defaults = Config::default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or(defaults.server.host),
        port: env
            .server_port
            .or(file_server.port)
            .unwrap_or(defaults.server.port),
    };

    let database = DatabaseConfig {
        url: env
            .database_url
            .or(file_database.url)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        max_connections: env
            .database_max_connections
            .or(file_database.max_connections)
            .unwrap_or(defaults.database.max_connections),
    };
    if let Some(url) = &database.url
        && !(url.starts_with("postgres://") || url.starts_with("postgresql://"))
    {
        return Err(ConfigLoadError::InvalidDatabaseUrl);
    }

    let cors = CorsConfig {
        allowed_origins: env
            .cors_allowed_origins
            .or(file_cors.allowed_origins)
            .unwrap_or(defaults.cors.allowed_origins),
        allowed_methods: env
            .cors_allowed_methods
            .or(file_cors.allowed_methods)
            .unwrap_or(defaults.cors.allowed_methods),
        allowed_headers: env
            .cors_allowed_headers
            .or(file_cors.allowed_headers)
            .unwrap_or(defaults.cors.allowed_headers),
        allow_credentials: env
            .cors_allow_credentials
            .or(file_cors.allow_credentials)
            .unwrap_or(defaults.cors.allow_credentials),
    };

    let auth = AuthConfig {
        token_key: env
            .auth_token_key
            .or(file_auth.token_key)
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(defaults.auth.token_key),
        session_ttl: duration_setting(
            "AUTH_SESSION_TTL",
            env.auth_session_ttl.or(file_auth.session_ttl),
        )?
        .unwrap_or(defaults.auth.session_ttl),
    };

    let location = LocationConfig {
        code_ttl: duration_setting(
            "LOCATION_CODE_TTL",
            env.location_code_ttl.or(file_location.code_ttl),
        )?
        .unwrap_or(defaults.location.code_ttl),
        token_ttl: duration_setting(
            "LOCATION_TOKEN_TTL",
            env.location_token_ttl.or(file_location.token_ttl),
        )?
        .unwrap_or(defaults.location.token_ttl),
        travel_idle_timeout: duration_setting(
            "TRAVEL_IDLE_TIMEOUT",
            env.travel_idle_timeout.or(file_location.travel_idle_timeout),
        )?
        .unwrap_or(defaults.location.travel_idle_timeout),
        room_capacity: env
            .room_capacity
            .or(file_location.room_capacity)
            .unwrap_or(defaults.location.room_capacity),
        sweep_interval: match env.sweep_interval.or(file_location.sweep_interval)
        {
            Some(raw) => parse_std_duration("SWEEP_INTERVAL", &raw)?,
            None => defaults.location.sweep_interval,
        },
    };

    let jobs = JobsConfig {
        in_progress_cancellation: match env
            .in_progress_cancellation
            .or(file_jobs.in_progress_cancellation)
        {
            Some(raw) => raw.parse().map_err(|reason| {
                ConfigLoadError::InvalidSetting {
                    field: "IN_PROGRESS_CANCELLATION",
                    reason,
                }
            })?,
            None => defaults.jobs.in_progress_cancellation,
        },
    };

    let dev_mode = env.dev_mode.or(file_dev_mode).unwrap_or(false);

    let config = Config {
        server,
        database,
        cors,
        auth,
        location,
        jobs,
        dev_mode,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded,
        },
    };

    let guard_warnings = validation::apply_guard_rails(&config)?;
    warnings.extend(guard_warnings);

    Ok((config, warnings))
}

fn parse_std_duration(
    field: &'static str,
    raw: &str,
) -> Result<StdDuration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|err| {
        ConfigLoadError::InvalidSetting {
            field,
            reason: format!("`{raw}` is not a duration: {err}"),
        }
    })
}

fn duration_setting(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<chrono::Duration>, ConfigLoadError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let parsed = parse_std_duration(field, &raw)?;
    chrono::Duration::from_std(parsed)
        .map(Some)
        .map_err(|_| ConfigLoadError::InvalidSetting {
            field,
            reason: format!("`{raw}` is out of range"),
        })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("database URL must start with postgres:// or postgresql://")]
    InvalidDatabaseUrl,
    #[error("invalid {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewlink_core::domain::CancellationPolicy;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    fn isolated() -> ConfigLoader {
        ConfigLoader::new()
    }

    #[test]
    fn defaults_apply_in_dev_mode() {
        let load = isolated()
            .load_with_env(env(&[("DEV_MODE", "true")]), false)
            .unwrap();

        assert_eq!(load.config.server.port, 3000);
        assert_eq!(load.config.location.code_ttl, chrono::Duration::minutes(30));
        assert_eq!(load.config.location.token_ttl, chrono::Duration::hours(8));
        assert_eq!(
            load.config.location.travel_idle_timeout,
            chrono::Duration::minutes(15)
        );
        assert_eq!(
            load.config.jobs.in_progress_cancellation,
            CancellationPolicy::Deny
        );
        assert!(!load.config.uses_database());
        assert!(load.warnings.mentions("crewlink.toml"));
        assert!(load.warnings.mentions("DATABASE_URL"));
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
dev_mode = true

[server]
port = 4100
host = "127.0.0.1"

[location]
code_ttl = "10m"
room_capacity = 32

[jobs]
in_progress_cancellation = "customer"
"#
        )
        .unwrap();

        let load = isolated()
            .with_config_path(file.path())
            .load_with_env(
                env(&[("SERVER_PORT", "4200"), ("LOCATION_TOKEN_TTL", "2h")]),
                false,
            )
            .unwrap();
        let config = load.config;

        assert_eq!(config.server.port, 4200);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.location.code_ttl, chrono::Duration::minutes(10));
        assert_eq!(config.location.token_ttl, chrono::Duration::hours(2));
        assert_eq!(config.location.room_capacity, 32);
        assert_eq!(
            config.jobs.in_progress_cancellation,
            CancellationPolicy::Customer
        );
        assert_eq!(config.metadata.config_path.as_deref(), Some(file.path()));
        assert!(!load.warnings.mentions("crewlink.toml"));
    }

    #[test]
    fn malformed_durations_name_the_setting() {
        let err = isolated()
            .load_with_env(
                env(&[("DEV_MODE", "1"), ("TRAVEL_IDLE_TIMEOUT", "soon")]),
                false,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidSetting {
                field: "TRAVEL_IDLE_TIMEOUT",
                ..
            }
        ));
    }

    #[test]
    fn unknown_cancellation_policy_is_rejected() {
        let err = isolated()
            .load_with_env(
                env(&[("DEV_MODE", "1"), ("IN_PROGRESS_CANCELLATION", "anyone")]),
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("IN_PROGRESS_CANCELLATION"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = isolated()
            .with_config_path("/definitely/not/here/crewlink.toml")
            .load_with_env(EnvConfig::default(), false)
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }

    #[test]
    fn non_postgres_urls_are_rejected() {
        let err = isolated()
            .load_with_env(
                env(&[("DEV_MODE", "1"), ("DATABASE_URL", "mysql://db/crewlink")]),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidDatabaseUrl));
    }

    #[test]
    fn production_posture_requires_a_real_key() {
        let err = isolated()
            .load_with_env(EnvConfig::default(), false)
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::GuardRail(_)));
    }
}
