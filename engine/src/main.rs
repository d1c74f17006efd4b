// Relay Engine
// Main entry point for the relay binary

use clap::Parser;
use relay_engine::cli::{Cli, Command};
use relay_engine::config::Config;
use relay_engine::handlers::{handle_doctor, handle_serve, OutputFormat};
use relay_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the configured level; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry(log_level);

    tracing::info!("Relay Engine v{}", env!("CARGO_PKG_VERSION"));

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(
                "Starting server on {}:{}",
                config.server.host,
                config.server.port
            );
            handle_serve(&config).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
