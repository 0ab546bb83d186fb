//! Configuration schema types
//!
//! This module defines the configuration structure for Prism. The file format
//! is YAML; unrecognized keys are rejected at the root so typos surface as
//! configuration errors instead of silently-ignored sections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main Prism configuration
///
/// This is the root configuration structure that maps to the YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Payer name → TOC or in-network endpoint URL
    pub payer_endpoints: BTreeMap<String, String>,

    /// Billing codes to keep; empty means no whitelist filtering
    #[serde(default)]
    pub cpt_whitelist: Vec<String>,

    /// Processing knobs and budgets
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Output destinations
    pub output: OutputConfig,

    /// Rate sanity bounds and per-code ceilings
    #[serde(default)]
    pub quality_rules: QualityRules,

    /// HTTP retrieval settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending key if any value is invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.payer_endpoints.is_empty() {
            return Err("payer_endpoints cannot be empty".to_string());
        }
        for (name, url) in &self.payer_endpoints {
            if name.trim().is_empty() {
                return Err("payer_endpoints contains an empty payer name".to_string());
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!(
                    "payer_endpoints.{name} must be an http(s) URL, got '{url}'"
                ));
            }
        }
        self.processing.validate()?;
        self.output.validate()?;
        self.quality_rules.validate()?;
        self.fetch.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Processing configuration and per-run budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Rows buffered per entity before a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent payer pipelines
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,

    /// Budget: cap on in-network files per payer
    #[serde(default)]
    pub max_files_per_payer: Option<usize>,

    /// Budget: cap on raw items per file
    #[serde(default)]
    pub max_records_per_file: Option<u64>,

    /// Budget: per-pipeline wall clock in seconds
    #[serde(default)]
    pub max_processing_time_seconds: Option<u64>,

    /// Quality gate: minimum completeness percentage (0-100)
    #[serde(default = "default_min_completeness_pct")]
    pub min_completeness_pct: f64,

    /// Quality gate: minimum accuracy score (0-1)
    #[serde(default = "default_min_accuracy_score")]
    pub min_accuracy_score: f64,

    /// Resident-row memory ceiling that triggers early flushes
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: usize,
}

impl ProcessingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("processing.batch_size must be greater than 0".to_string());
        }
        if self.parallel_workers == 0 {
            return Err("processing.parallel_workers must be greater than 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.min_completeness_pct) {
            return Err(format!(
                "processing.min_completeness_pct must be within 0-100, got {}",
                self.min_completeness_pct
            ));
        }
        if !(0.0..=1.0).contains(&self.min_accuracy_score) {
            return Err(format!(
                "processing.min_accuracy_score must be within 0-1, got {}",
                self.min_accuracy_score
            ));
        }
        if self.memory_threshold_mb == 0 {
            return Err("processing.memory_threshold_mb must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallel_workers: default_parallel_workers(),
            max_files_per_payer: None,
            max_records_per_file: None,
            max_processing_time_seconds: None,
            min_completeness_pct: default_min_completeness_pct(),
            min_accuracy_score: default_min_accuracy_score(),
            memory_threshold_mb: default_memory_threshold_mb(),
        }
    }
}

/// Output destination configuration
///
/// At least one of `local_directory` and `s3` must be set; when both are,
/// files land locally and are mirrored to S3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub local_directory: Option<String>,

    #[serde(default)]
    pub s3: Option<S3Config>,
}

impl OutputConfig {
    fn validate(&self) -> Result<(), String> {
        if self.local_directory.is_none() && self.s3.is_none() {
            return Err("output requires local_directory and/or s3".to_string());
        }
        if let Some(dir) = &self.local_directory {
            if dir.trim().is_empty() {
                return Err("output.local_directory cannot be empty".to_string());
            }
        }
        if let Some(s3) = &self.s3 {
            s3.validate()?;
        }
        Ok(())
    }
}

/// S3 destination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    pub bucket: String,

    #[serde(default = "default_s3_prefix")]
    pub prefix: String,

    #[serde(default = "default_s3_region")]
    pub region: String,
}

impl S3Config {
    fn validate(&self) -> Result<(), String> {
        if self.bucket.trim().is_empty() {
            return Err("output.s3.bucket cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Rate sanity rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityRules {
    #[serde(default)]
    pub rates: RateBounds,

    #[serde(default)]
    pub high_cost_procedures: HighCostRules,
}

impl QualityRules {
    fn validate(&self) -> Result<(), String> {
        self.rates.validate()?;
        for (code, ceiling) in &self.high_cost_procedures.max_reasonable_rates {
            if *ceiling <= 0.0 {
                return Err(format!(
                    "quality_rules.high_cost_procedures.max_reasonable_rates.{code} must be positive"
                ));
            }
        }
        Ok(())
    }
}

impl Default for QualityRules {
    fn default() -> Self {
        Self {
            rates: RateBounds::default(),
            high_cost_procedures: HighCostRules::default(),
        }
    }
}

/// Global negotiated-rate bounds; a rate of exactly `min_rate` is admitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateBounds {
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,

    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
}

impl RateBounds {
    fn validate(&self) -> Result<(), String> {
        if self.min_rate <= 0.0 {
            return Err(format!(
                "quality_rules.rates.min_rate must be positive, got {}",
                self.min_rate
            ));
        }
        if self.max_rate < self.min_rate {
            return Err(format!(
                "quality_rules.rates.max_rate ({}) must be >= min_rate ({})",
                self.max_rate, self.min_rate
            ));
        }
        Ok(())
    }
}

impl Default for RateBounds {
    fn default() -> Self {
        Self {
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
        }
    }
}

/// Per-code rate ceilings for known high-cost procedures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HighCostRules {
    #[serde(default)]
    pub max_reasonable_rates: BTreeMap<String, f64>,
}

/// HTTP retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl FetchConfig {
    fn validate(&self) -> Result<(), String> {
        if self.timeout_seconds == 0 {
            return Err("fetch.timeout_seconds must be greater than 0".to_string());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("fetch.max_backoff_ms must be >= fetch.initial_backoff_ms".to_string());
        }
        Ok(())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write JSON logs to rolling files
    #[serde(default)]
    pub json_file_enabled: bool,

    /// Directory for rolling log files
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_file_enabled: false,
            directory: default_log_directory(),
        }
    }
}

fn default_batch_size() -> usize {
    10_000
}

fn default_parallel_workers() -> usize {
    4
}

fn default_min_completeness_pct() -> f64 {
    80.0
}

fn default_min_accuracy_score() -> f64 {
    0.85
}

fn default_memory_threshold_mb() -> usize {
    1024
}

fn default_min_rate() -> f64 {
    0.01
}

fn default_max_rate() -> f64 {
    100_000.0
}

fn default_s3_prefix() -> String {
    "healthcare-rates".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> PipelineConfig {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "centene".to_string(),
            "https://example.com/index.json".to_string(),
        );
        PipelineConfig {
            payer_endpoints: endpoints,
            cpt_whitelist: Vec::new(),
            processing: ProcessingConfig::default(),
            output: OutputConfig {
                local_directory: Some("out".to_string()),
                s3: None,
            },
            quality_rules: QualityRules::default(),
            fetch: FetchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let mut config = minimal();
        config.payer_endpoints.clear();
        assert!(config.validate().unwrap_err().contains("payer_endpoints"));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let mut config = minimal();
        config
            .payer_endpoints
            .insert("bad".to_string(), "ftp://example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_requires_a_destination() {
        let mut config = minimal();
        config.output = OutputConfig::default();
        assert!(config.validate().unwrap_err().contains("output"));
    }

    #[test]
    fn test_rate_bounds_ordering() {
        let mut config = minimal();
        config.quality_rules.rates.min_rate = 500.0;
        config.quality_rules.rates.max_rate = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_ranges() {
        let mut config = minimal();
        config.processing.min_accuracy_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.processing.min_completeness_pct = -1.0;
        assert!(config.validate().is_err());
    }
}
