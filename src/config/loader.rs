//! Configuration loading
//!
//! Reads the YAML configuration file, applies environment overrides, and
//! validates the result. All failures come back as
//! [`PrismError::Configuration`] so the CLI can map them to exit code 2.

use crate::config::schema::{PipelineConfig, S3Config};
use crate::domain::{PrismError, Result};
use std::path::Path;

/// Environment variable that overrides / enables the S3 destination
const S3_BUCKET_ENV: &str = "PRISM_S3_BUCKET";

/// Loads and validates configuration from a YAML file
///
/// # Errors
///
/// Returns [`PrismError::Configuration`] when the file is missing, the YAML
/// is malformed, or validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PrismError::Configuration(format!("Failed to read {}: {e}", path.display()))
    })?;

    let mut config: PipelineConfig = serde_yaml::from_str(&contents).map_err(|e| {
        PrismError::Configuration(format!("Failed to parse {}: {e}", path.display()))
    })?;

    apply_env_overrides(&mut config);

    config
        .validate()
        .map_err(PrismError::Configuration)?;

    tracing::info!(
        path = %path.display(),
        payers = config.payer_endpoints.len(),
        whitelist_codes = config.cpt_whitelist.len(),
        s3 = config.output.s3.is_some(),
        "Configuration loaded"
    );

    Ok(config)
}

/// The bucket can be supplied by the deployment environment instead of the
/// config file, mirroring how the scraper is run in CI.
fn apply_env_overrides(config: &mut PipelineConfig) {
    if let Ok(bucket) = std::env::var(S3_BUCKET_ENV) {
        if bucket.trim().is_empty() {
            return;
        }
        match &mut config.output.s3 {
            Some(s3) => s3.bucket = bucket,
            None => {
                config.output.s3 = Some(S3Config {
                    bucket,
                    prefix: "healthcare-rates".to_string(),
                    region: "us-east-1".to_string(),
                });
            }
        }
    }
}
