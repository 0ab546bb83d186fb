//! End-of-run processing statistics
//!
//! One manifest per payer, written at pipeline finalize under
//! `processing_statistics/<date>/<payer>.json`. This is the file operators
//! read first after a run, so it carries every counter the pipeline tracks.

use crate::normalize::RejectionCounters;
use crate::writer::batcher::BatcherStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file that failed, with the reason it was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub url: String,
    pub error: String,
}

/// Per-payer processing statistics manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerManifest {
    pub payer: String,
    pub payer_uuid: Uuid,
    pub index_url: String,

    pub files_found: u64,
    pub files_processed: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub failed_files: Vec<FailedFile>,

    /// Raw items pulled from in-network arrays
    pub records_extracted: u64,
    pub counters: RejectionCounters,
    pub output: BatcherStats,

    /// True when a budget stopped the pipeline before the TOC was exhausted
    pub truncated: bool,
    /// True when a shutdown signal stopped the pipeline
    pub cancelled: bool,

    pub duration_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

impl PayerManifest {
    /// Key the manifest is persisted under
    pub fn key(&self, date: &str) -> String {
        format!("processing_statistics/{date}/{}.json", self.payer)
    }

    /// A payer "emitted output" when at least one rate row was written
    pub fn emitted_output(&self) -> bool {
        self.output.rates_written > 0
    }

    /// A payer failed when its index was unusable or every processed file
    /// failed. A payer whose files parsed cleanly but produced zero rows
    /// (filtered or empty) did not fail.
    pub fn failed(&self) -> bool {
        if self.files_processed == 0 {
            return !self.failed_files.is_empty();
        }
        self.files_succeeded == 0
    }
}
