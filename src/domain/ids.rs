//! Domain identifier types with validation
//!
//! Newtype wrappers for the two natural keys in TiC data: the National
//! Provider Identifier (NPI) and the Taxpayer Identification Number (TIN).
//! Each type validates format on construction; NPI additionally exposes the
//! industry Luhn check, which the quality gate scores rather than enforces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// National Provider Identifier newtype wrapper
///
/// A 10-digit identifier assigned to every U.S. healthcare provider. The
/// check digit is validated with the Luhn mod-10 algorithm over the card
/// issuer prefix `80840` concatenated with the NPI, per the NPPES standard.
///
/// Construction only requires 10 ASCII digits; Luhn validity is a separate
/// predicate because payer files routinely carry typo'd NPIs that the
/// pipeline admits with a reduced accuracy score.
///
/// # Examples
///
/// ```
/// use prism::domain::ids::Npi;
/// use std::str::FromStr;
///
/// let npi = Npi::from_str("1234567893").unwrap();
/// assert!(npi.is_luhn_valid());
///
/// let suspect = Npi::from_str("1234567890").unwrap();
/// assert!(!suspect.is_luhn_valid());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Npi(String);

impl Npi {
    /// Creates a new Npi from a string of exactly 10 ASCII digits
    pub fn new(npi: impl Into<String>) -> Result<Self, String> {
        let npi = npi.into();
        if npi.len() != 10 || !npi.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("NPI must be exactly 10 digits, got '{npi}'"));
        }
        Ok(Self(npi))
    }

    /// Builds an Npi from a numeric value as payer files often encode them
    pub fn from_number(npi: u64) -> Result<Self, String> {
        Self::new(format!("{npi:010}"))
    }

    /// Returns the NPI as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Luhn mod-10 check over `80840` + the 9-digit base, compared against
    /// the trailing check digit.
    pub fn is_luhn_valid(&self) -> bool {
        let digits: Vec<u32> = format!("80840{}", &self.0[..9])
            .bytes()
            .map(|b| (b - b'0') as u32)
            .collect();

        let mut sum = 0u32;
        for (i, d) in digits.iter().rev().enumerate() {
            // The rightmost digit of the prefixed base is doubled first.
            let mut v = *d;
            if i % 2 == 0 {
                v *= 2;
                if v > 9 {
                    v -= 9;
                }
            }
            sum += v;
        }

        let check = (10 - sum % 10) % 10;
        check == (self.0.as_bytes()[9] - b'0') as u32
    }
}

impl fmt::Display for Npi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Npi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Npi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Taxpayer Identification Number newtype wrapper
///
/// Identifies the billing organization. Payers report TINs either as EINs
/// (`12-3456789`) or bare 9-digit strings; both are accepted and preserved
/// verbatim. Canonicalization happens in the identity service, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tin(String);

impl Tin {
    /// Creates a new Tin from a non-empty string
    pub fn new(tin: impl Into<String>) -> Result<Self, String> {
        let tin = tin.into();
        if tin.trim().is_empty() {
            return Err("TIN cannot be empty".to_string());
        }
        Ok(Self(tin))
    }

    /// Returns the TIN as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }

    /// True when the TIN matches one of the two accepted shapes:
    /// `NN-NNNNNNN` or nine bare digits. Used as a quality factor.
    pub fn is_well_formed(&self) -> bool {
        let b = self.0.as_bytes();
        match b.len() {
            9 => b.iter().all(|c| c.is_ascii_digit()),
            10 => {
                b[2] == b'-'
                    && b[..2].iter().all(|c| c.is_ascii_digit())
                    && b[3..].iter().all(|c| c.is_ascii_digit())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Tin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Tin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
