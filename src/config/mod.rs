//! Configuration management
//!
//! YAML configuration schema and loader. The configuration is read once at
//! startup, validated, and shared immutably across the run.

pub mod loader;
pub mod schema;

pub use loader::load_config;
pub use schema::{
    FetchConfig, HighCostRules, LoggingConfig, OutputConfig, PipelineConfig, ProcessingConfig,
    QualityRules, RateBounds, S3Config,
};
