//! Valrun Server
//!
//! REST API server and worker host for the valuation run engine.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use valrun_core::pricing::PricerRegistry;
use valrun_runtime::{Orchestrator, TaskScheduler};
use valrun_server::config::{build_config, CliArgs as ConfigCliArgs, ServerConfig};
use valrun_server::server::{spawn_workers, Server};
use valrun_store::{MemoryStore, PgStore, Stores};

/// Valrun Server - REST API for distributed valuation runs
#[derive(Parser, Debug)]
#[command(name = "valrun_server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, env = "VALRUN_SERVER_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "VALRUN_SERVER_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VALRUN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Postgres connection URL (in-memory store when absent)
    #[arg(long, env = "VALRUN_DATABASE_URL")]
    database_url: Option<String>,

    /// Number of in-process workers
    #[arg(long, env = "VALRUN_WORKER_COUNT")]
    workers: Option<u32>,
}

impl From<Args> for ConfigCliArgs {
    fn from(args: Args) -> Self {
        ConfigCliArgs {
            config_file: args.config,
            host: args.host,
            port: args.port,
            log_level: args.log_level,
            database_url: args.database_url,
            workers: args.workers,
        }
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_stores(config: &ServerConfig) -> anyhow::Result<Stores> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_db_connections).await?;
            tracing::info!("Connected to Postgres store");
            Ok(Stores::from_backend(Arc::new(store)))
        }
        None => {
            tracing::warn!("No database URL configured, using the in-memory store");
            Ok(Stores::from_backend(Arc::new(MemoryStore::new())))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cli_args: ConfigCliArgs = args.into();
    let config = build_config(&cli_args)?;

    init_tracing(config.log_level.as_filter_str());

    tracing::info!("Valrun Server v{}", valrun_server::VERSION);
    tracing::info!(
        host = %config.host,
        port = %config.port,
        log_level = %config.log_level,
        environment = %config.environment,
        worker_count = %config.worker_count,
        backend = if config.database_url.is_some() { "postgres" } else { "memory" },
        "Server configuration loaded"
    );

    let stores = build_stores(&config).await?;
    let scheduler = TaskScheduler::new(stores.tasks.clone(), config.scheduler.clone());
    let orchestrator = Arc::new(Orchestrator::new(stores, scheduler, config.failure_policy));

    let mut registry = PricerRegistry::new();
    valrun_pricers::register_builtin(&mut registry);
    let registry = Arc::new(registry);
    tracing::info!(capabilities = ?registry, "Pricer registry initialised");

    let (stop, shutdown) = watch::channel(false);
    let workers = spawn_workers(orchestrator.clone(), registry.clone(), &config, shutdown);

    let server = Server::new(config, orchestrator, registry);
    tracing::info!(address = %server.socket_addr(), "Starting server");

    let serve = tokio::spawn(server.run());
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping workers");

    stop.send(true).ok();
    for worker in workers {
        worker.await.ok();
    }
    serve.abort();

    Ok(())
}
