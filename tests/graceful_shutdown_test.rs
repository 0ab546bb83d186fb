//! Integration tests for graceful shutdown
//!
//! These tests verify that:
//! - Shutdown signals propagate to every pipeline
//! - A cancelled run still flushes what it buffered
//! - The exit code reports cancellation

use flate2::write::GzEncoder;
use flate2::Compression;
use prism::config::{OutputConfig, PipelineConfig};
use prism::fetch::MemoryFetcher;
use prism::payers::HandlerRegistry;
use prism::pipeline::{Orchestrator, EXIT_CANCELLED};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

#[tokio::test]
async fn test_shutdown_signal_channel_propagation() {
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[tokio::test]
async fn test_pre_cancelled_run_exits_with_cancelled_code() {
    let toc = json!({
        "reporting_structure": [{
            "plan_name": "PPO",
            "in_network_files": [{"location": "https://x/rates.json.gz"}]
        }]
    });
    let rates = json!({
        "in_network": [{
            "billing_code": "99213",
            "billing_code_type": "CPT",
            "negotiated_rates": [{
                "provider_groups": [{
                    "npi": ["1234567893"],
                    "tin": {"type": "ein", "value": "12-3456789"}
                }],
                "negotiated_prices": [{
                    "negotiated_rate": 81.84,
                    "service_code": ["11"],
                    "billing_class": "professional"
                }]
            }]
        }]
    });
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rates.to_string().as_bytes()).unwrap();
    let rates_gz = encoder.finish().unwrap();

    let mut fetcher = MemoryFetcher::new();
    fetcher.insert("https://x/index.json", toc.to_string().into_bytes());
    fetcher.insert("https://x/rates.json.gz", rates_gz);

    let dir = TempDir::new().unwrap();
    let mut endpoints = BTreeMap::new();
    endpoints.insert("centene".to_string(), "https://x/index.json".to_string());
    let config = PipelineConfig {
        payer_endpoints: endpoints,
        cpt_whitelist: Vec::new(),
        processing: Default::default(),
        output: OutputConfig {
            local_directory: Some(dir.path().to_string_lossy().to_string()),
            s3: None,
        },
        quality_rules: Default::default(),
        fetch: Default::default(),
        logging: Default::default(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let summary = Orchestrator::new(
        Arc::new(config),
        Arc::new(HandlerRegistry::with_builtins()),
        Arc::new(fetcher),
    )
    .run(shutdown_rx)
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.exit_code(), EXIT_CANCELLED);

    // The manifest is still written on a cancelled run.
    let stats_root = dir.path().join("processing_statistics");
    assert!(stats_root.exists());
}
