use std::path::Path;

use clap::{Parser, Subcommand};
use tracing::info;

use logscope_server::api::AppState;
use logscope_server::config::LogscopeConfig;
use logscope_server::store_factory::create_stores;

/// Log-analytics HTTP server.
#[derive(Parser, Debug)]
#[command(name = "logscope-server", about = "HTTP server for logscope")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "logscope.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the log tables for the configured backend, then exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from TOML file, or use defaults if the file does not exist.
    let config_exists = Path::new(&cli.config).exists();
    let config: LogscopeConfig = if config_exists {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        toml::from_str("")?
    };

    logscope_server::telemetry::init(&config.logging);

    if !config_exists {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    if let Some(Commands::Migrate) = cli.command {
        return run_migrate(&config).await;
    }

    let stores = create_stores(&config.store).await?;
    let state = AppState::from_config(stores, &config);
    let app = logscope_server::api::router(state);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        address = %addr,
        backend = %config.store.backend,
        cache = config.cache.enabled,
        "logscope-server listening"
    );

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("logscope-server shut down");
    Ok(())
}

/// Run the `migrate` subcommand. Creating the stores runs the backend's
/// idempotent migrations.
async fn run_migrate(config: &LogscopeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(backend = %config.store.backend, "running store migrations...");
    let _stores = create_stores(&config.store).await?;
    info!(backend = %config.store.backend, "store migrations complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
