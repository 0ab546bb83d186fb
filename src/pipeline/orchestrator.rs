//! Pipeline orchestration
//!
//! Runs one [`PayerPipeline`] per configured endpoint under a worker pool of
//! `parallel_workers` permits. Pipelines own their state; the writer is the
//! only shared component and serializes per partition internally. The
//! shutdown channel fans out to every pipeline and is observed at their next
//! suspension point.

use crate::config::PipelineConfig;
use crate::domain::Result;
use crate::fetch::Fetcher;
use crate::payers::HandlerRegistry;
use crate::pipeline::payer::PayerPipeline;
use crate::pipeline::summary::RunSummary;
use crate::writer::{create_store, EntityWriter};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};

/// Orchestrates a whole run across payers
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    registry: Arc<HandlerRegistry>,
    fetcher: Arc<dyn Fetcher>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        registry: Arc<HandlerRegistry>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            registry,
            fetcher,
        }
    }

    fn staging_dir(&self) -> PathBuf {
        match &self.config.output.local_directory {
            Some(dir) => PathBuf::from(dir).join(".staging"),
            None => std::env::temp_dir().join(format!("prism-staging-{}", std::process::id())),
        }
    }

    /// Executes the run and returns its summary
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let started = Instant::now();
        let date = Utc::now().format("%Y-%m-%d").to_string();

        let store = create_store(&self.config.output)?;
        let writer = Arc::new(EntityWriter::new(store, self.staging_dir())?);

        tracing::info!(
            payers = self.config.payer_endpoints.len(),
            workers = self.config.processing.parallel_workers,
            destination = %writer.describe(),
            handlers = ?self.registry.available(),
            "Run started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.processing.parallel_workers));
        let mut tasks = Vec::new();

        for (name, endpoint) in &self.config.payer_endpoints {
            let pipeline = PayerPipeline::new(
                name.clone(),
                endpoint.clone(),
                self.config.clone(),
                self.registry.get(name),
                self.fetcher.clone(),
                writer.clone(),
                shutdown.clone(),
                date.clone(),
            );
            let semaphore = semaphore.clone();
            let payer = name.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("worker semaphore closed");
                tracing::debug!(payer = %payer, "Worker acquired");
                pipeline.run().await
            }));
        }

        let mut summary = RunSummary::new();
        for task in tasks {
            match task.await {
                Ok(manifest) => summary.add(manifest),
                Err(e) => {
                    // A panicked pipeline must not take down the run.
                    tracing::error!(error = %e, "Payer pipeline task failed");
                }
            }
        }

        summary.cancelled = *shutdown.borrow()
            || summary.manifests.iter().any(|m| m.cancelled);
        summary = summary.with_duration(started.elapsed());
        summary.log_summary();

        Ok(summary)
    }
}

/// Convenience wrapper used by the CLI: builds the orchestrator from parts
pub async fn run_pipelines(
    config: Arc<PipelineConfig>,
    registry: Arc<HandlerRegistry>,
    fetcher: Arc<dyn Fetcher>,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    Orchestrator::new(config, registry, fetcher)
        .run(shutdown)
        .await
}
