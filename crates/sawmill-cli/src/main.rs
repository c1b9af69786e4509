//! Sawmill CLI - framed-message ingest server entry point

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod error;

use cli::Cli;
use config::AppConfig;
use error::Result;
use sawmill_server::ServerBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose)?;

    // Load configuration and apply CLI overrides
    let mut config = load_configuration(&cli)?;
    config.apply_overrides(&cli);
    config.validate()?;

    // Build the server with the built-in codec and logging listener
    let server = Arc::new(ServerBuilder::new().with_config(config.server).build()?);

    // Run the accept loop until Ctrl-C
    let accept = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    server.stop().await;

    match accept.await {
        Ok(Ok(())) => info!("server stopped"),
        Ok(Err(e)) => {
            error!("server exited with error: {}", e);
            return Err(e.into());
        }
        Err(e) => error!("accept task panicked: {}", e),
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        AppConfig::load_from_file(config_path)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}
