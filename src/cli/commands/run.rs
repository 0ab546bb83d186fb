//! Run command implementation
//!
//! Wires configuration, handler registry, fetcher and orchestrator together
//! and maps the run summary to the process exit code.

use crate::config::PipelineConfig;
use crate::fetch::HttpFetcher;
use crate::payers::HandlerRegistry;
use crate::pipeline::{run_pipelines, EXIT_CONFIG_ERROR};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config: PipelineConfig,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = Arc::new(config);
        let registry = Arc::new(HandlerRegistry::with_builtins());
        let fetcher = Arc::new(HttpFetcher::new(config.fetch.clone())?);

        let summary = match run_pipelines(config, registry, fetcher, shutdown).await {
            Ok(summary) => summary,
            Err(e) if matches!(e, crate::domain::PrismError::Configuration(_)) => {
                eprintln!("Configuration error: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(summary.exit_code())
    }
}
