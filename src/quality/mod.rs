//! Per-row quality scoring
//!
//! Every candidate rate row gets two scores before it is admitted:
//! completeness (fraction of required fields present) and accuracy (product
//! of penalty factors for suspect values). A row is admitted only when both
//! clear their configured thresholds. Scoring never rejects data outright
//! for a bad NPI or TIN; it discounts, and the thresholds decide.

use crate::domain::ids::{Npi, Tin};

/// Fixed sanity band for the accuracy factor. Rates outside this band are
/// not impossible, just suspect; the configured bounds do the hard
/// filtering upstream.
const SANITY_MIN: f64 = 0.0;
const SANITY_MAX: f64 = 10_000.0;

/// Accuracy penalty factors
const NPI_LUHN_PENALTY: f64 = 0.5;
const RATE_BAND_PENALTY: f64 = 0.6;
const TIN_FORMAT_PENALTY: f64 = 0.8;

/// The fields a candidate row is scored on
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub service_code: &'a str,
    pub billing_code_type: &'a str,
    pub negotiated_rate: f64,
    pub billing_class: &'a str,
    pub tin: Option<&'a str>,
    pub npis: &'a [String],
}

/// Scoring outcome for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub completeness: f64,
    pub accuracy: f64,
    pub admitted: bool,
    /// Set when the row failed the completeness threshold
    pub failed_completeness: bool,
    /// Set when the row failed the accuracy threshold
    pub failed_accuracy: bool,
}

/// Threshold-configured quality gate
#[derive(Debug, Clone)]
pub struct QualityGate {
    min_completeness: f64,
    min_accuracy: f64,
}

impl QualityGate {
    /// Builds a gate from the configured thresholds
    /// (`min_completeness_pct` is a percentage, 0-100)
    pub fn new(min_completeness_pct: f64, min_accuracy_score: f64) -> Self {
        Self {
            min_completeness: min_completeness_pct / 100.0,
            min_accuracy: min_accuracy_score,
        }
    }

    /// Scores a row and decides admission
    pub fn score(&self, row: &RowView<'_>) -> Verdict {
        let completeness = completeness_score(row);
        let accuracy = accuracy_score(row);

        let failed_completeness = completeness < self.min_completeness;
        let failed_accuracy = accuracy < self.min_accuracy;

        Verdict {
            completeness,
            accuracy,
            admitted: !failed_completeness && !failed_accuracy,
            failed_completeness,
            failed_accuracy,
        }
    }
}

/// Fraction of required fields present
fn completeness_score(row: &RowView<'_>) -> f64 {
    let required = [
        !row.service_code.is_empty(),
        !row.billing_code_type.is_empty(),
        row.negotiated_rate.is_finite(),
        !row.billing_class.is_empty(),
        row.tin.map(|t| !t.is_empty()).unwrap_or(false),
    ];
    let present = required.iter().filter(|p| **p).count();
    present as f64 / required.len() as f64
}

/// Product of penalty factors
fn accuracy_score(row: &RowView<'_>) -> f64 {
    let mut score = 1.0;

    let all_npis_valid = row
        .npis
        .iter()
        .all(|n| Npi::new(n.as_str()).map(|n| n.is_luhn_valid()).unwrap_or(false));
    if !row.npis.is_empty() && !all_npis_valid {
        score *= NPI_LUHN_PENALTY;
    }

    if !(row.negotiated_rate > SANITY_MIN && row.negotiated_rate <= SANITY_MAX) {
        score *= RATE_BAND_PENALTY;
    }

    if let Some(tin) = row.tin {
        let well_formed = Tin::new(tin).map(|t| t.is_well_formed()).unwrap_or(false);
        if !well_formed {
            score *= TIN_FORMAT_PENALTY;
        }
    }

    score
}
