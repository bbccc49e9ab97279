//! Layered server configuration: environment over `crewlink.toml` over
//! built-in defaults, followed by guard rails.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AuthConfig, Config, ConfigMetadata, CorsConfig, DEFAULT_TOKEN_KEY,
    DatabaseConfig, JobsConfig, LocationConfig, ServerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
