use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use named_lock_core::coordinator::LockCoordinator;
use named_lock_mysql::MySqlLockProvider;
use named_lock_server::{ConfigLoader, logging, serve, shared, shutdown_signal};

/// Named-lock HTTP server backed by MySQL.
#[derive(Debug, Parser)]
#[command(name = "named-lock-server", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "NAMED_LOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let mut config = loader.load().context("loading configuration")?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    logging::init(&config.log)
        .map_err(|e| anyhow::anyhow!(e))
        .context("initialising logging")?;

    let provider = MySqlLockProvider::builder()
        .connection_string(&config.database.url)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .build()
        .await
        .context("connecting to MySQL")?;

    if config.database.ensure_schema {
        provider
            .ensure_schema()
            .await
            .context("creating tables")?;
    }

    let history = config.database.record_history.then(|| provider.history());
    let coordinator = LockCoordinator::new(provider.clone()).with_history(history);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;

    serve(
        listener,
        shared(coordinator),
        shutdown_signal(),
        config.server.shutdown_grace(),
    )
    .await
    .context("serving HTTP")?;

    info!("closing connection pool");
    provider.close().await;
    Ok(())
}
