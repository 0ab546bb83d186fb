//! Result type alias for Prism operations

use crate::domain::errors::PrismError;

/// Standard result type used throughout the crate
pub type Result<T> = std::result::Result<T, PrismError>;
