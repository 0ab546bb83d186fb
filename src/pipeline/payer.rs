//! Per-payer pipeline state machine
//!
//! One pipeline per configured endpoint: fetch the index, enumerate its
//! in-network files, and stream each file through handler → normalizer →
//! batcher. Errors are scoped: a bad row is counted, a bad file is skipped,
//! and only an unreachable or unparseable index fails the payer. Budgets
//! (file count, records per file, wall clock) flip the pipeline into
//! finalize and mark the run truncated rather than failed; a shutdown
//! signal does the same but marks it cancelled. Whatever was buffered when
//! the pipeline stops is flushed.

use crate::analytics::AnalyticsBuilder;
use crate::config::PipelineConfig;
use crate::domain::entities::PayerRecord;
use crate::domain::errors::ParseError;
use crate::domain::raw::{ProviderGroup, RawInNetworkItem};
use crate::domain::{PrismError, Result};
use crate::fetch::Fetcher;
use crate::identity;
use crate::normalize::{EntityIndex, Normalizer, RejectionCounters};
use crate::payers::PayerHandler;
use crate::stream::{
    extract_provider_references, InNetworkReader, MrfFile, MrfFileKind, TocReader, TocShape,
};
use crate::writer::{EntityWriter, FailedFile, PayerBatcher, PayerManifest};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Capacity of the parsed-item channel between the blocking parse task and
/// the async normalize/write loop. Bounds resident raw items and is the
/// backpressure point for the whole file.
const ITEM_CHANNEL_CAPACITY: usize = 256;

/// Why a file stopped yielding items
enum FileEnd {
    Exhausted,
    RecordBudget,
    Deadline,
    Cancelled,
    Failed(String),
}

struct FileOutcome {
    records_extracted: u64,
    end: FileEnd,
}

/// One payer's pipeline
pub struct PayerPipeline {
    name: String,
    endpoint: String,
    payer_uuid: Uuid,
    config: Arc<PipelineConfig>,
    handler: Arc<dyn PayerHandler>,
    fetcher: Arc<dyn Fetcher>,
    writer: Arc<EntityWriter>,
    shutdown: watch::Receiver<bool>,
    date: String,
}

impl PayerPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        config: Arc<PipelineConfig>,
        handler: Arc<dyn PayerHandler>,
        fetcher: Arc<dyn Fetcher>,
        writer: Arc<EntityWriter>,
        shutdown: watch::Receiver<bool>,
        date: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let payer_uuid = identity::payer_uuid(&name);
        Self {
            name,
            endpoint: endpoint.into(),
            payer_uuid,
            config,
            handler,
            fetcher,
            writer,
            shutdown,
            date: date.into(),
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Runs the pipeline to completion and returns its manifest.
    ///
    /// Never returns an error: every failure mode ends in a manifest that
    /// records what happened.
    pub async fn run(self) -> PayerManifest {
        let started = Instant::now();
        let deadline = self
            .config
            .processing
            .max_processing_time_seconds
            .map(|secs| started + Duration::from_secs(secs));

        // The payer master record; one per configured endpoint per run.
        let payer = PayerRecord {
            payer_uuid: self.payer_uuid,
            payer_name: self.name.clone(),
            index_url: self.endpoint.clone(),
            last_scraped: Utc::now(),
        };
        tracing::info!(
            payer = %payer.payer_name,
            payer_uuid = %payer.payer_uuid,
            endpoint = %payer.index_url,
            "Pipeline started"
        );

        let mut manifest = PayerManifest {
            payer: payer.payer_name.clone(),
            payer_uuid: payer.payer_uuid,
            index_url: payer.index_url.clone(),
            files_found: 0,
            files_processed: 0,
            files_succeeded: 0,
            files_failed: 0,
            failed_files: Vec::new(),
            records_extracted: 0,
            counters: RejectionCounters::default(),
            output: Default::default(),
            truncated: false,
            cancelled: false,
            duration_seconds: 0.0,
            completed_at: Utc::now(),
        };

        // FETCH_TOC / PARSE_TOC
        let files = match self.enumerate_files().await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(payer = %self.name, error = %e, "Payer failed: index unusable");
                manifest.failed_files.push(FailedFile {
                    url: self.endpoint.clone(),
                    error: e.to_string(),
                });
                manifest.duration_seconds = started.elapsed().as_secs_f64();
                manifest.completed_at = Utc::now();
                return manifest;
            }
        };

        let rate_files: Vec<MrfFile> = files
            .into_iter()
            .filter(|f| f.kind != MrfFileKind::AllowedAmounts)
            .collect();
        manifest.files_found = rate_files.len() as u64;

        let budgeted_files = match self.config.processing.max_files_per_payer {
            Some(limit) if rate_files.len() > limit => {
                tracing::info!(
                    payer = %self.name,
                    found = rate_files.len(),
                    limit,
                    "File budget truncates this payer"
                );
                manifest.truncated = true;
                rate_files.into_iter().take(limit).collect()
            }
            _ => rate_files,
        };

        tracing::info!(
            payer = %self.name,
            files = budgeted_files.len(),
            "Enumerated in-network files"
        );

        let normalizer = Normalizer::new(self.payer_uuid, &self.config);
        let mut index = EntityIndex::new();
        let mut analytics = AnalyticsBuilder::new();
        let mut batcher = PayerBatcher::new(
            self.writer.clone(),
            self.name.clone(),
            self.date.clone(),
            self.config.processing.batch_size,
            self.config.processing.memory_threshold_mb,
        );

        // FOR_EACH_FILE { FETCH → PARSE → NORMALIZE → WRITE }
        for file in &budgeted_files {
            if self.is_shutdown() {
                manifest.cancelled = true;
                break;
            }
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                tracing::info!(payer = %self.name, "Wall-clock budget exhausted");
                manifest.truncated = true;
                break;
            }

            manifest.files_processed += 1;
            match self
                .process_file(file, &normalizer, &mut index, &mut analytics, &mut batcher, &mut manifest.counters, deadline)
                .await
            {
                Ok(outcome) => {
                    manifest.records_extracted += outcome.records_extracted;
                    match outcome.end {
                        FileEnd::Exhausted => {
                            manifest.files_succeeded += 1;
                        }
                        FileEnd::RecordBudget => {
                            manifest.files_succeeded += 1;
                            manifest.truncated = true;
                            break;
                        }
                        FileEnd::Deadline => {
                            manifest.files_succeeded += 1;
                            manifest.truncated = true;
                            break;
                        }
                        FileEnd::Cancelled => {
                            manifest.files_succeeded += 1;
                            manifest.cancelled = true;
                            break;
                        }
                        FileEnd::Failed(error) => {
                            manifest.files_failed += 1;
                            manifest.failed_files.push(FailedFile {
                                url: file.url.clone(),
                                error,
                            });
                        }
                    }
                }
                Err(e) => {
                    // Fetch-level failure for this file; the payer lives on.
                    tracing::warn!(payer = %self.name, url = %file.url, error = %e, "File skipped");
                    manifest.files_failed += 1;
                    manifest.failed_files.push(FailedFile {
                        url: file.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // FINALIZE: flush partial output, write analytics and the manifest.
        if let Err(e) = batcher.flush_all().await {
            tracing::error!(payer = %self.name, error = %e, "Final flush failed");
        }
        if !analytics.is_empty() {
            let records = analytics.finalize();
            if let Err(e) = batcher.write_analytics(&records).await {
                tracing::error!(payer = %self.name, error = %e, "Analytics write failed");
            }
        }

        manifest.output = batcher.stats.clone();
        manifest.duration_seconds = started.elapsed().as_secs_f64();
        manifest.completed_at = Utc::now();

        if let Err(e) = self
            .writer
            .write_json(&manifest.key(&self.date), &manifest)
            .await
        {
            tracing::error!(payer = %self.name, error = %e, "Manifest write failed");
        }

        tracing::info!(
            payer = %self.name,
            files_succeeded = manifest.files_succeeded,
            files_failed = manifest.files_failed,
            records = manifest.records_extracted,
            admitted = manifest.counters.admitted,
            organizations = index.organization_count(),
            providers = index.provider_count(),
            truncated = manifest.truncated,
            cancelled = manifest.cancelled,
            duration_seconds = manifest.duration_seconds,
            "Pipeline done"
        );

        manifest
    }

    /// Fetches the endpoint and enumerates in-network files, auto-detecting
    /// whether it is a TOC or itself a rates file.
    async fn enumerate_files(&self) -> Result<Vec<MrfFile>> {
        let stream = self.fetcher.open(&self.endpoint).await?;
        let read = stream.into_read();

        let (entries, shape) = tokio::task::spawn_blocking(
            move || -> std::result::Result<(Vec<MrfFile>, TocShape), ParseError> {
                let mut reader = TocReader::new(read);
                let mut entries = Vec::new();
                for entry in reader.by_ref() {
                    entries.push(entry?);
                }
                Ok((entries, reader.shape()))
            },
        )
        .await
        .map_err(|e| PrismError::Other(format!("toc task panicked: {e}")))??;

        if shape == TocShape::DirectRates {
            // The endpoint serves rates directly; synthesize a single entry.
            return Ok(vec![MrfFile {
                url: self.endpoint.clone(),
                kind: MrfFileKind::InNetworkRates,
                plan_name: self.name.clone(),
                plan_id: None,
                plan_market_type: None,
                description: "direct in-network endpoint".to_string(),
                reporting_structure_index: 0,
                file_index: 0,
                provider_reference_url: None,
            }]);
        }

        Ok(entries
            .into_iter()
            .map(|entry| self.handler.preprocess_toc(entry))
            .collect())
    }

    /// Loads the provider-reference table for a file: the external file when
    /// the TOC names one, otherwise a first pass over the file itself.
    async fn load_provider_references(
        &self,
        file: &MrfFile,
    ) -> Result<HashMap<u64, Vec<ProviderGroup>>> {
        let url = file
            .provider_reference_url
            .as_deref()
            .unwrap_or(&file.url)
            .to_string();
        let stream = self.fetcher.open(&url).await?;
        let read = stream.into_read();
        let references =
            tokio::task::spawn_blocking(move || extract_provider_references(read))
                .await
                .map_err(|e| PrismError::Other(format!("reference task panicked: {e}")))??;
        if !references.is_empty() {
            tracing::debug!(payer = %self.name, url = %url, groups = references.len(), "Loaded provider references");
        }
        Ok(references)
    }

    /// Streams one rates file through the full chain.
    #[allow(clippy::too_many_arguments)]
    async fn process_file(
        &self,
        file: &MrfFile,
        normalizer: &Normalizer,
        index: &mut EntityIndex,
        analytics: &mut AnalyticsBuilder,
        batcher: &mut PayerBatcher,
        counters: &mut RejectionCounters,
        deadline: Option<Instant>,
    ) -> Result<FileOutcome> {
        tracing::info!(payer = %self.name, url = %file.url, plan = %file.plan_name, "Processing file");

        // Size/encoding probe, for the log only; servers that reject HEAD
        // don't block processing.
        if let Ok(head) = self.fetcher.head(&file.url).await {
            tracing::debug!(
                payer = %self.name,
                url = %file.url,
                size = head.size,
                content_encoding = head.content_encoding.as_deref().unwrap_or(""),
                "File diagnostics"
            );
        }

        // Two-pass read: references first, then items.
        let references = self.load_provider_references(file).await?;

        let stream = self.fetcher.open(&file.url).await?;
        let read = stream.into_read();

        let (tx, mut rx) =
            mpsc::channel::<std::result::Result<RawInNetworkItem, ParseError>>(ITEM_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_parser = stop.clone();

        let parse_task = tokio::task::spawn_blocking(move || {
            for item in InNetworkReader::new(read) {
                if stop_parser.load(Ordering::Relaxed) {
                    break;
                }
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        let mut records: u64 = 0;
        let mut end = FileEnd::Exhausted;

        while let Some(next) = rx.recv().await {
            if self.is_shutdown() {
                end = FileEnd::Cancelled;
                break;
            }
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                end = FileEnd::Deadline;
                break;
            }

            let item = match next {
                Ok(item) => item,
                Err(e) => {
                    // Whatever was yielded before the error has already been
                    // normalized and flushed downstream.
                    end = FileEnd::Failed(e.to_string());
                    break;
                }
            };

            records += 1;
            if let Some(limit) = self.config.processing.max_records_per_file {
                if records > limit {
                    records -= 1;
                    end = FileEnd::RecordBudget;
                    break;
                }
            }

            let parsed = match self.handler.parse_in_network(item) {
                Ok(parsed) => parsed,
                Err(e) => {
                    end = FileEnd::Failed(
                        PrismError::Handler {
                            payer: self.name.clone(),
                            message: e.to_string(),
                        }
                        .to_string(),
                    );
                    break;
                }
            };

            for item in parsed {
                let batch = normalizer.normalize_item(&item, file, &references, index, counters);
                for rate in &batch.rates {
                    analytics.observe(
                        &rate.service_code,
                        rate.negotiated_rate,
                        rate.organization_uuid,
                        rate.payer_uuid,
                    );
                }
                if !batch.is_empty() {
                    batcher.push(batch).await?;
                }
            }
        }

        // Unwind the parser: it observes the stop flag at its next item.
        stop.store(true, Ordering::Relaxed);
        rx.close();
        let _ = parse_task.await;

        Ok(FileOutcome {
            records_extracted: records,
            end,
        })
    }
}
