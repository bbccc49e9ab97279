use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use crewlink_core::{MIGRATOR, database::Repositories};
use crewlink_server::{
    AppState,
    infra::{
        config::{Config, ConfigLoad, ConfigLoader},
        startup::spawn_maintenance,
    },
    routes,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "crewlink-server")]
#[command(about = "Job marketplace server with bidding and live location sharing")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Path to a TOML config file (overrides CONFIG_PATH)
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        match command {
            Command::Db(DbCommand::Migrate) => {
                run_db_migrate(&cli.serve).await?;
                return Ok(());
            }
        }
    }

    run_server(cli.serve).await
}

async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let Some(pool) = connect_database(&config).await? else {
        return Err(anyhow::anyhow!(
            "DATABASE_URL must be set to apply migrations"
        ));
    };
    MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Arc<Config>> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config.clone() {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        location.code_ttl = %config.location.code_ttl,
        location.token_ttl = %config.location.token_ttl,
        location.travel_idle_timeout = %config.location.travel_idle_timeout,
        location.room_capacity = config.location.room_capacity,
        jobs.in_progress_cancellation = %config.jobs.in_progress_cancellation,
        "marketplace configuration in effect"
    );

    Ok(Arc::new(config))
}

async fn connect_database(config: &Config) -> anyhow::Result<Option<PgPool>> {
    let Some(url) = config.database.url.as_deref() else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await
        .map_err(|err| {
            error!(error = %err, "PostgreSQL connection failed");
            anyhow::anyhow!("Database connection failed: {err}")
        })?;
    info!("Successfully connected to PostgreSQL");
    Ok(Some(pool))
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(&args)?;

    let repositories = match connect_database(&config).await? {
        Some(pool) => {
            MIGRATOR
                .run(&pool)
                .await
                .context("database migration failed")?;
            Repositories::postgres(pool)
        }
        None => {
            warn!("Running with in-memory storage; state is lost on restart");
            Repositories::in_memory()
        }
    };

    let state = AppState::new(Arc::clone(&config), repositories)
        .context("failed to initialise location crypto")?;
    let maintenance = spawn_maintenance(state.clone());

    let app = routes::create_app(state);
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;

    info!("Server listening on http://{addr}");
    if config.dev_mode {
        warn!("DEV_MODE is enabled; POST /api/v1/dev/sessions mints sessions without authentication");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
