//! Run summary and exit disposition
//!
//! Per-payer manifests merge into one run summary at end of run. The
//! summary decides the process exit code: 0 for success (truncations
//! included), 3 when every configured payer failed to emit any output,
//! 4 when the run was cancelled.

use crate::normalize::RejectionCounters;
use crate::writer::PayerManifest;
use serde::Serialize;
use std::time::Duration;

/// Exit code for a successful run (possibly truncated)
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for configuration errors
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// Exit code when every payer failed to emit output
pub const EXIT_ALL_PAYERS_FAILED: i32 = 3;
/// Exit code when the run was cancelled
pub const EXIT_CANCELLED: i32 = 4;

/// Aggregated outcome of one run
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub payers_processed: usize,
    pub payers_with_output: usize,
    pub payers_failed: usize,
    pub payers_truncated: usize,

    pub files_found: u64,
    pub files_processed: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,

    pub records_extracted: u64,
    pub counters: RejectionCounters,

    pub cancelled: bool,
    pub duration_seconds: f64,

    pub manifests: Vec<PayerManifest>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one payer's manifest into the summary
    pub fn add(&mut self, manifest: PayerManifest) {
        self.payers_processed += 1;
        if manifest.emitted_output() {
            self.payers_with_output += 1;
        }
        if manifest.failed() {
            self.payers_failed += 1;
        }
        if manifest.truncated {
            self.payers_truncated += 1;
        }
        self.files_found += manifest.files_found;
        self.files_processed += manifest.files_processed;
        self.files_succeeded += manifest.files_succeeded;
        self.files_failed += manifest.files_failed;
        self.records_extracted += manifest.records_extracted;
        self.counters.merge(&manifest.counters);
        self.manifests.push(manifest);
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_seconds = duration.as_secs_f64();
        self
    }

    /// Process exit code for this run. Non-zero only when the run was
    /// cancelled or every configured payer failed to emit any output.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            return EXIT_CANCELLED;
        }
        if self.payers_processed > 0
            && self.payers_failed == self.payers_processed
            && self.payers_with_output == 0
        {
            return EXIT_ALL_PAYERS_FAILED;
        }
        EXIT_SUCCESS
    }

    /// Logs the end-of-run summary
    pub fn log_summary(&self) {
        tracing::info!(
            payers = self.payers_processed,
            payers_with_output = self.payers_with_output,
            payers_failed = self.payers_failed,
            payers_truncated = self.payers_truncated,
            files_found = self.files_found,
            files_succeeded = self.files_succeeded,
            files_failed = self.files_failed,
            records_extracted = self.records_extracted,
            admitted = self.counters.admitted,
            rejected_whitelist = self.counters.rejected_whitelist,
            rejected_bounds = self.counters.rejected_bounds,
            rejected_completeness = self.counters.rejected_completeness,
            rejected_accuracy = self.counters.rejected_accuracy,
            cancelled = self.cancelled,
            duration_seconds = self.duration_seconds,
            "Run completed"
        );
    }
}
