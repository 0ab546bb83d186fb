//! Handler for Horizon Blue Cross Blue Shield
//!
//! Horizon splits files by service type and geographic region and reports
//! TINs as bare strings. Region-specific metadata lives outside the fields
//! the canonical model keeps; what matters here is case normalization and
//! hoisting the occasional nested providers array.

use crate::domain::{RawInNetworkItem, Result};
use crate::payers::PayerHandler;

pub struct HorizonHandler;

impl PayerHandler for HorizonHandler {
    fn name(&self) -> &'static str {
        "horizon"
    }

    fn parse_in_network(&self, mut item: RawInNetworkItem) -> Result<Vec<RawInNetworkItem>> {
        for rate_group in &mut item.negotiated_rates {
            for group in &mut rate_group.provider_groups {
                if group.npi.is_empty() && !group.providers.is_empty() {
                    let mut hoisted: Vec<String> = group
                        .providers
                        .iter()
                        .flat_map(|p| p.npi.iter().cloned())
                        .collect();
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
    fn test_horizon_string_tin_and_nested_providers() {
        let item: RawInNetworkItem = serde_json::from_value(json!({
            "billing_code": "72148",
            "billing_code_type": "CPT",
            "negotiated_rates": [{
                "provider_groups": [{
                    "tin": "22-7654321",
                    "providers": [{"npi": [1598765432u64]}]
                }],
                "negotiated_prices": [{
                    "negotiated_rate": 310.25,
                    "billing_class": "INSTITUTIONAL",
                    "service_code": ["21"]
                }]
            }]
        }))
        .unwrap();

        let out = HorizonHandler.parse_in_network(item).unwrap();
        let group = &out[0].negotiated_rates[0].provider_groups[0];
        assert_eq!(group.npi, vec!["1598765432"]);
        assert_eq!(group.tin.as_ref().unwrap().value, "22-7654321");
        assert_eq!(
            out[0].negotiated_rates[0].negotiated_prices[0].billing_class,
            "institutional"
        );
    }
}
