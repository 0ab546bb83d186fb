//! Per-payer structural adapters
//!
//! Payers publish structurally divergent MRFs. A [`PayerHandler`] massages a
//! payer's records into the canonical raw shape before normalization; the
//! [`HandlerRegistry`] maps payer identifiers to handlers and falls back to
//! a pass-through default for payers that follow the CMS schema. The
//! registry is populated once at startup and read-only afterwards.

mod aetna;
mod bcbs_fl;
mod bcbs_il;
mod centene;
mod horizon;

pub use aetna::AetnaHandler;
pub use bcbs_fl::BcbsFlHandler;
pub use bcbs_il::BcbsIlHandler;
pub use centene::CenteneHandler;
pub use horizon::HorizonHandler;

use crate::domain::{RawInNetworkItem, Result};
use crate::stream::MrfFile;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-payer adapter
///
/// Implementations must preserve the `RawInNetworkItem` contract: each input
/// item maps to zero or more canonical-shape items.
pub trait PayerHandler: Send + Sync {
    /// Canonical handler name
    fn name(&self) -> &'static str;

    /// Massages one in-network item into canonical shape.
    ///
    /// The default is the identity.
    fn parse_in_network(&self, item: RawInNetworkItem) -> Result<Vec<RawInNetworkItem>> {
        Ok(vec![item])
    }

    /// Hook to adjust a TOC entry before the file is fetched.
    ///
    /// The default is the identity.
    fn preprocess_toc(&self, entry: MrfFile) -> MrfFile {
        entry
    }
}

/// Pass-through handler for CMS-conformant payers
pub struct DefaultHandler;

impl PayerHandler for DefaultHandler {
    fn name(&self) -> &'static str {
        "default"
    }
}

/// Name → handler lookup with a pass-through default
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn PayerHandler>>,
    default: Arc<dyn PayerHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry with only the default handler
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: Arc::new(DefaultHandler),
        }
    }

    /// Creates a registry populated with every built-in handler
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (names, handler) in builtin_handlers() {
            for name in names {
                registry.register(name, handler.clone());
            }
        }
        registry
    }

    /// Registers a handler under a payer identifier (case-insensitive)
    pub fn register(&mut self, name: &str, handler: Arc<dyn PayerHandler>) {
        self.handlers.insert(name.to_lowercase(), handler);
    }

    /// Resolves a payer identifier; unknown identifiers get the default
    pub fn get(&self, name: &str) -> Arc<dyn PayerHandler> {
        self.handlers
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Identifiers with a dedicated handler, for startup diagnostics
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Static discovery table: every handler implementation and the payer
/// identifiers it serves.
fn builtin_handlers() -> Vec<(&'static [&'static str], Arc<dyn PayerHandler>)> {
    vec![
        (
            &["centene", "centene_fidelis", "fidelis", "centene_ambetter"],
            Arc::new(CenteneHandler) as Arc<dyn PayerHandler>,
        ),
        (
            &["aetna", "aetna_florida", "aetna_health_inc"],
            Arc::new(AetnaHandler),
        ),
        (
            &["horizon", "horizon_bcbs", "horizon_healthcare"],
            Arc::new(HorizonHandler),
        ),
        (&["bcbs_fl"], Arc::new(BcbsFlHandler)),
        (&["bcbs_il"], Arc::new(BcbsIlHandler)),
    ]
}
