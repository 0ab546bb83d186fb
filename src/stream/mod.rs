//! Incremental JSON streaming
//!
//! Event-driven readers for the two document families the pipeline consumes:
//! payer indexes (TOC) and in-network rate files. Both operate in constant
//! memory over the number of elements; only one element is ever materialized
//! at a time.

pub mod events;
pub mod in_network;
pub mod toc;

pub use in_network::{extract_provider_references, InNetworkReader};
pub use toc::{MrfFile, MrfFileKind, TocReader, TocShape};
