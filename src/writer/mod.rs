//! Batched columnar output
//!
//! Normalized rows accumulate in per-entity buffers and flush as partitioned
//! Parquet part files through a shared writer, which persists them to the
//! configured store (local directory, S3, or both). A per-payer statistics
//! manifest is written at end of run.

pub mod batcher;
pub mod manifest;
pub mod parquet;
pub mod store;

pub use batcher::{BatcherStats, EntityType, EntityWriter, PayerBatcher};
pub use manifest::{FailedFile, PayerManifest};
pub use store::{create_store, LocalStore, OutputStore, S3Store};
