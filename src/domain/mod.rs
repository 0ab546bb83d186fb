//! Core domain types and models
//!
//! This module contains the domain layer: error taxonomy, validated
//! identifier newtypes, the raw payer-side record shapes, and the canonical
//! output entities.

pub mod entities;
pub mod errors;
pub mod ids;
pub mod raw;
pub mod result;

pub use entities::{
    AnalyticsRecord, DataLineage, GeographicScope, MarketStatistics, OrganizationRecord,
    PayerRecord, PlanDetails, ProviderRecord, RateRecord,
};
pub use errors::{FetchError, ParseError, PrismError};
pub use ids::{Npi, Tin};
pub use raw::{
    NegotiatedPrice, NegotiatedRate, ProviderGroup, ProviderReferenceEntry, RawInNetworkItem,
};
pub use result::Result;
