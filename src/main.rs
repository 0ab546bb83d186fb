// Prism - Transparency in Coverage MRF ETL Engine
// Copyright (c) 2025 Prism Contributors
// Licensed under the MIT License

use clap::Parser;
use prism::cli::{Cli, Commands};
use prism::config::load_config;
use prism::logging::init_logging;
use prism::pipeline::EXIT_CONFIG_ERROR;
use std::process;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Commands::Run(args) => {
            // Configuration first: its logging section feeds the subscriber.
            let config = match load_config(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(EXIT_CONFIG_ERROR);
                }
            };

            let log_level = cli
                .log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone());
            let _guard = match init_logging(&log_level, &config.logging) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Failed to initialize logging: {e}");
                    process::exit(EXIT_CONFIG_ERROR);
                }
            };

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %cli.config,
                "Prism - Transparency in Coverage MRF ETL"
            );

            let shutdown_rx = install_shutdown_handler();

            match args.execute(config, shutdown_rx).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!(error = %e, "Run failed");
                    eprintln!("Error: {e}");
                    1
                }
            }
        }
        Commands::ValidateConfig(args) => match args.execute(&cli.config).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {e}");
                1
            }
        },
    };

    process::exit(exit_code);
}

/// Installs SIGINT/SIGTERM handlers that flip the shutdown channel; every
/// pipeline observes it at its next suspension point and unwinds cleanly.
fn install_shutdown_handler() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to create SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, finishing current batches before exit");
                    let _ = shutdown_tx.send(true);
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, finishing current batches before exit");
                    let _ = shutdown_tx.send(true);
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            } else {
                tracing::info!("Received SIGINT, finishing current batches before exit");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    shutdown_rx
}
