//! Integration tests for configuration loading and validation

use prism::config::load_config;
use prism::domain::PrismError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let file = write_config(
        r#"
payer_endpoints:
  centene_fidelis: "https://www.centene.com/content/dam/tic/index.json"
  bcbs_il: "https://app.bcbsil.com/mrf/toc.json.gz"

cpt_whitelist:
  - "99213"
  - "99214"
  - "70553"

processing:
  batch_size: 5000
  parallel_workers: 2
  max_files_per_payer: 25
  max_records_per_file: 500000
  max_processing_time_seconds: 3600
  min_completeness_pct: 85.0
  min_accuracy_score: 0.9
  memory_threshold_mb: 512

output:
  local_directory: "healthcare_rates"
  s3:
    bucket: "tic-rates"
    prefix: "healthcare-rates"
    region: "us-east-2"

quality_rules:
  rates:
    min_rate: 0.5
    max_rate: 50000.0
  high_cost_procedures:
    max_reasonable_rates:
      "70553": 5000.0
      "72148": 3500.0

fetch:
  timeout_seconds: 90
  max_retries: 5

logging:
  level: "debug"
  json_file_enabled: false
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.payer_endpoints.len(), 2);
    assert_eq!(config.cpt_whitelist.len(), 3);
    assert_eq!(config.processing.batch_size, 5000);
    assert_eq!(config.processing.max_processing_time_seconds, Some(3600));
    assert_eq!(config.processing.memory_threshold_mb, 512);
    assert_eq!(config.output.s3.as_ref().unwrap().region, "us-east-2");
    assert_eq!(
        config
            .quality_rules
            .high_cost_procedures
            .max_reasonable_rates
            .len(),
        2
    );
    assert_eq!(config.fetch.timeout_seconds, 90);
    assert_eq!(config.fetch.max_retries, 5);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_defaults_applied() {
    let file = write_config(
        r#"
payer_endpoints:
  centene: "https://example.com/index.json"
output:
  local_directory: "out"
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.processing.batch_size, 10_000);
    assert_eq!(config.processing.parallel_workers, 4);
    assert_eq!(config.processing.min_completeness_pct, 80.0);
    assert_eq!(config.processing.min_accuracy_score, 0.85);
    assert_eq!(config.processing.max_files_per_payer, None);
    assert_eq!(config.quality_rules.rates.min_rate, 0.01);
    assert_eq!(config.fetch.timeout_seconds, 120);
    assert_eq!(config.fetch.max_retries, 3);
}

#[test]
fn test_missing_payer_endpoints_rejected() {
    let file = write_config(
        r#"
payer_endpoints: {}
output:
  local_directory: "out"
"#,
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, PrismError::Configuration(_)));
    assert!(err.to_string().contains("payer_endpoints"));
}

#[test]
fn test_missing_output_rejected() {
    let file = write_config(
        r#"
payer_endpoints:
  centene: "https://example.com/index.json"
"#,
    );
    assert!(load_config(file.path()).is_err());
}

#[test]
fn test_bad_thresholds_rejected() {
    let file = write_config(
        r#"
payer_endpoints:
  centene: "https://example.com/index.json"
processing:
  min_completeness_pct: 150.0
output:
  local_directory: "out"
"#,
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("min_completeness_pct"));
}

#[test]
fn test_inverted_rate_bounds_rejected() {
    let file = write_config(
        r#"
payer_endpoints:
  centene: "https://example.com/index.json"
output:
  local_directory: "out"
quality_rules:
  rates:
    min_rate: 100.0
    max_rate: 1.0
"#,
    );
    assert!(load_config(file.path()).is_err());
}

#[test]
fn test_malformed_yaml_is_config_error() {
    let file = write_config("payer_endpoints:\n  - [broken");
    let err = load_config(file.path()).unwrap_err();
    assert!(matches!(err, PrismError::Configuration(_)));
}
