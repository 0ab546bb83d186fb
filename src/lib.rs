// Prism - Transparency in Coverage MRF ETL Engine
// Copyright (c) 2025 Prism Contributors
// Licensed under the MIT License

//! # Prism - Transparency in Coverage MRF ETL
//!
//! Prism ingests the Machine-Readable Files U.S. payers publish under the
//! Transparency-in-Coverage rule, normalizes their heterogeneous JSON
//! schemas into a canonical relational model, and writes partitioned
//! Parquet to local disk or S3.
//!
//! ## Overview
//!
//! The core is a streaming engine that:
//! - walks a payer's Table-of-Contents index lazily,
//! - streams each in-network rate file (multi-GB, usually gzipped) with
//!   bounded memory through an event-driven JSON parser,
//! - dispatches per-payer schema quirks through a handler registry,
//! - assigns deterministic UUIDv5 identities so reruns are idempotent,
//! - scores every row for completeness and accuracy before admission,
//! - batches output per entity and flushes partitioned columnar files.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`pipeline`] - Per-payer state machine, orchestration, run summary
//! - [`fetch`] - HTTP retrieval with retry/backoff and streaming gzip
//! - [`stream`] - Incremental TOC and in-network parsing
//! - [`payers`] - Handler registry and per-payer adapters
//! - [`normalize`] - Canonicalization, filtering, entity deduplication
//! - [`quality`] - Per-row completeness/accuracy scoring
//! - [`identity`] - Deterministic UUIDv5 derivation
//! - [`writer`] - Batching, Parquet encoding, partitioned stores, manifests
//! - [`analytics`] - End-of-run market statistics
//! - [`domain`] - Entities, raw shapes, identifiers, error taxonomy
//! - [`config`] - YAML configuration schema and loading
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prism::config::load_config;
//! use prism::fetch::HttpFetcher;
//! use prism::payers::HandlerRegistry;
//! use prism::pipeline::Orchestrator;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(load_config("prism.yaml")?);
//!     let registry = Arc::new(HandlerRegistry::with_builtins());
//!     let fetcher = Arc::new(HttpFetcher::new(config.fetch.clone())?);
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let orchestrator = Orchestrator::new(config, registry, fetcher);
//!     let summary = orchestrator.run(shutdown_rx).await?;
//!
//!     std::process::exit(summary.exit_code());
//! }
//! ```

pub mod analytics;
pub mod cli;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod identity;
pub mod logging;
pub mod normalize;
pub mod payers;
pub mod pipeline;
pub mod quality;
pub mod stream;
pub mod writer;
