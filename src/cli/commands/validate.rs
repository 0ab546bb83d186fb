//! Validate config command implementation

use crate::config::load_config;
use crate::pipeline::{EXIT_CONFIG_ERROR, EXIT_SUCCESS};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        println!("Validating configuration file: {config_path}");

        let config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                println!("Configuration invalid: {e}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        };

        println!("Configuration is valid");
        println!();
        println!("Summary:");
        println!("  Payers: {}", config.payer_endpoints.len());
        for (name, url) in &config.payer_endpoints {
            println!("    {name}: {url}");
        }
        println!("  Whitelisted codes: {}", config.cpt_whitelist.len());
        println!("  Batch size: {}", config.processing.batch_size);
        println!("  Parallel workers: {}", config.processing.parallel_workers);
        println!(
            "  Rate bounds: {} - {}",
            config.quality_rules.rates.min_rate, config.quality_rules.rates.max_rate
        );
        match (&config.output.local_directory, &config.output.s3) {
            (Some(dir), Some(s3)) => println!("  Output: {dir} mirrored to s3://{}", s3.bucket),
            (Some(dir), None) => println!("  Output: {dir}"),
            (None, Some(s3)) => println!("  Output: s3://{}", s3.bucket),
            (None, None) => {}
        }

        Ok(EXIT_SUCCESS)
    }
}
