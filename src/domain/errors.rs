//! Domain error types
//!
//! This module defines the error hierarchy for Prism. All errors are
//! domain-specific and don't expose third-party types. Only configuration
//! errors are fatal; everything else is scoped to the smallest meaningful
//! unit (row, file, payer) by the pipeline.

use thiserror::Error;

/// Main Prism error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum PrismError {
    /// Configuration-related errors (fatal, pre-run)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fetch-related errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Streaming parse errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Payer handler errors; treated like parse errors by the pipeline
    #[error("Handler error for payer '{payer}': {message}")]
    Handler { payer: String, message: String },

    /// Per-row validation errors; counted, never propagated past the row
    #[error("Validation error: {0}")]
    Validation(String),

    /// Output write errors
    #[error("Write error: {0}")]
    Write(String),

    /// A per-run resource budget was exhausted; triggers graceful truncation
    #[error("Budget exhausted: {0}")]
    BudgetExceeded(String),

    /// The run was cancelled by a shutdown signal or timeout
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl PrismError {
    /// True when the pipeline should retry the operation that produced this
    /// error instead of skipping the resource.
    pub fn is_transient(&self) -> bool {
        matches!(self, PrismError::Fetch(f) if f.is_transient())
    }
}

/// Fetch-specific errors
///
/// The transient/permanent split drives the retry policy: transient errors
/// are retried with backoff, permanent errors skip the resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, TLS, reset); retryable
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Request exceeded its deadline; retryable
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Server error or throttling (5xx / 429); retryable
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 429); not retryable
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Transport failure mid-body; retryable
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Retries exhausted; carries the last transient error
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    /// Malformed URL or unsupported scheme; not retryable
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether this error class is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::ConnectionFailed(_)
                | FetchError::Timeout(_)
                | FetchError::ServerError { .. }
                | FetchError::StreamInterrupted(_)
        )
    }
}

/// Streaming parse errors
///
/// Carries the byte offset of the failure in the decompressed stream so a
/// skipped file can be diagnosed without re-running the pipeline.
#[derive(Debug, Error)]
#[error("{message} at byte offset {offset}")]
pub struct ParseError {
    /// Byte offset into the (decompressed) stream where parsing failed
    pub offset: u64,
    /// Description of the failure
    pub message: String,
}

impl ParseError {
    /// Creates a parse error at the given stream offset
    pub fn new(offset: u64, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PrismError {
    fn from(err: std::io::Error) -> Self {
        PrismError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PrismError {
    fn from(err: serde_json::Error) -> Self {
        PrismError::Serialization(err.to_string())
    }
}

// Conversion from serde_yaml parse errors
impl From<serde_yaml::Error> for PrismError {
    fn from(err: serde_yaml::Error) -> Self {
        PrismError::Configuration(format!("YAML parse error: {err}"))
    }
}
