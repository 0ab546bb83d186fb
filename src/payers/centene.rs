//! Handler for Centene-family payers (Fidelis, Ambetter)
//!
//! Centene publishes a CMS-conformant structure with direct NPI/TIN pairs in
//! `provider_groups`, but is sloppy about casing: negotiated types and
//! negotiation arrangements appear in mixed case, and billing-code-type
//! versions carry stray whitespace.

use crate::domain::{RawInNetworkItem, Result};
use crate::payers::PayerHandler;

pub struct CenteneHandler;

impl PayerHandler for CenteneHandler {
    fn name(&self) -> &'static str {
        "centene"
    }

    fn parse_in_network(&self, mut item: RawInNetworkItem) -> Result<Vec<RawInNetworkItem>> {
        if let Some(arrangement) = item.negotiation_arrangement.as_mut() {
            *arrangement = arrangement.to_lowercase();
        }
        if let Some(version) = item.billing_code_type_version.as_mut() {
            *version = version.trim().to_string();
        }

        for rate_group in &mut item.negotiated_rates {
            for price in &mut rate_group.negotiated_prices {
                price.negotiated_type = price.negotiated_type.to_lowercase();
            }
        }

        Ok(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_centene_case_normalization() {
        let item: RawInNetworkItem = serde_json::from_value(json!({
            "negotiation_arrangement": "FFS",
            "billing_code": "99213",
            "billing_code_type": "CPT",
            "billing_code_type_version": " 2024 ",
            "negotiated_rates": [{
                "provider_groups": [{"npi": [1234567893u64], "tin": {"type": "ein", "value": "12-3456789"}}],
                "negotiated_prices": [{
                    "negotiated_type": "Negotiated",
                    "negotiated_rate": 81.84,
                    "service_code": "11",
                    "billing_class": "professional"
                }]
            }]
        }))
        .unwrap();

        let out = CenteneHandler.parse_in_network(item).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].negotiation_arrangement.as_deref(), Some("ffs"));
        assert_eq!(out[0].billing_code_type_version.as_deref(), Some("2024"));
        let price = &out[0].negotiated_rates[0].negotiated_prices[0];
        assert_eq!(price.negotiated_type, "negotiated");
        // Scalar service codes are already normalized at the serde layer.
        assert_eq!(price.service_code, vec!["11"]);
    }
}
