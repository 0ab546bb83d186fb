//! Handler for Aetna's hybrid provider structure
//!
//! Aetna mixes embedded provider groups with reference ids in the same rate
//! group, and some HealthSparq-era extracts nest providers one level deeper
//! in a `providers` array. Nested NPIs are hoisted into the group so the
//! normalizer sees a single shape.

use crate::domain::{RawInNetworkItem, Result};
use crate::payers::PayerHandler;

pub struct AetnaHandler;

impl PayerHandler for AetnaHandler {
    fn name(&self) -> &'static str {
        "aetna"
    }

    fn parse_in_network(&self, mut item: RawInNetworkItem) -> Result<Vec<RawInNetworkItem>> {
        for rate_group in &mut item.negotiated_rates {
            for group in &mut rate_group.provider_groups {
                if group.npi.is_empty() && !group.providers.is_empty() {
                    let mut hoisted: Vec<String> = Vec::new();
                    for provider in &group.providers {
                        hoisted.extend(provider.npi.iter().cloned());
                    }
                    hoisted.sort();
                    hoisted.dedup();
                    group.npi = hoisted;
                }
                group.providers.clear();
            }

            for price in &mut rate_group.negotiated_prices {
                price.billing_class = price.billing_class.to_lowercase();
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
    fn test_aetna_hoists_nested_providers() {
        let item: RawInNetworkItem = serde_json::from_value(json!({
            "billing_code": "73721",
            "billing_code_type": "CPT",
            "negotiated_rates": [{
                "provider_groups": [{
                    "tin": "12-3456789",
                    "providers": [
                        {"npi": [1234567893u64]},
                        {"npi": ["1679576722", "1234567893"]}
                    ]
                }],
                "negotiated_prices": [{
                    "negotiated_rate": 402.0,
                    "billing_class": "Professional",
                    "service_code": ["22"]
                }]
            }]
        }))
        .unwrap();

        let out = AetnaHandler.parse_in_network(item).unwrap();
        let group = &out[0].negotiated_rates[0].provider_groups[0];
        assert_eq!(group.npi, vec!["1234567893", "1679576722"]);
        assert!(group.providers.is_empty());
        // String TINs become typed objects at the serde layer.
        assert_eq!(group.tin.as_ref().unwrap().value, "12-3456789");
        assert_eq!(
            out[0].negotiated_rates[0].negotiated_prices[0].billing_class,
            "professional"
        );
    }

    #[test]
    fn test_direct_npis_untouched() {
        let item: RawInNetworkItem = serde_json::from_value(json!({
            "billing_code": "73721",
            "billing_code_type": "CPT",
            "negotiated_rates": [{
                "provider_groups": [{"npi": ["1234567893"], "tin": {"type": "ein", "value": "12-3456789"}}],
                "negotiated_prices": []
            }]
        }))
        .unwrap();

        let out = AetnaHandler.parse_in_network(item).unwrap();
        assert_eq!(
            out[0].negotiated_rates[0].provider_groups[0].npi,
            vec!["1234567893"]
        );
    }
}
