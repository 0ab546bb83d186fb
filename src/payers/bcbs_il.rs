//! Handler for BCBS Illinois
//!
//! BCBS-IL publishes payer-defined `LOCAL` billing codes alongside CPT/HCPCS
//! and attaches `covered_services` payloads to bundled arrangements. LOCAL
//! codes are passed through verbatim; bundle payloads are dropped from the
//! canonical shape (only the bundle's own negotiated prices are kept).

use crate::domain::{RawInNetworkItem, Result};
use crate::payers::PayerHandler;

pub struct BcbsIlHandler;

impl PayerHandler for BcbsIlHandler {
    fn name(&self) -> &'static str {
        "bcbs_il"
    }

    fn parse_in_network(&self, mut item: RawInNetworkItem) -> Result<Vec<RawInNetworkItem>> {
        item.billing_code_type = item.billing_code_type.trim().to_uppercase();
        item.covered_services = None;

        for rate_group in &mut item.negotiated_rates {
            for price in &mut rate_group.negotiated_prices {
                price.billing_class = price.billing_class.to_lowercase();
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
    fn test_local_codes_pass_through() {
        let item: RawInNetworkItem = serde_json::from_value(json!({
            "billing_code": "IL-IMG-004",
            "billing_code_type": " local ",
            "covered_services": [{"billing_code": "73721"}],
            "negotiated_rates": [{
                "provider_groups": [{"npi": ["1234567893"], "tin": {"type": "ein", "value": "36-1234567"}}],
                "negotiated_prices": [{
                    "negotiated_rate": 955.0,
                    "negotiated_type": "Negotiated",
                    "billing_class": "Institutional",
                    "service_code": ["22"]
                }]
            }]
        }))
        .unwrap();

        let out = BcbsIlHandler.parse_in_network(item).unwrap();
        assert_eq!(out[0].billing_code, "IL-IMG-004");
        assert_eq!(out[0].billing_code_type, "LOCAL");
        assert!(out[0].covered_services.is_none());
        let price = &out[0].negotiated_rates[0].negotiated_prices[0];
        assert_eq!(price.billing_class, "institutional");
        assert_eq!(price.negotiated_type, "negotiated");
    }
}
