//! Canonical output entities
//!
//! The relational model the pipeline emits: rates, organizations, providers,
//! payers and analytics. Identifier fields are UUIDv5 strings assigned by the
//! identity service; nested blocks are serialized to JSON strings by the
//! writer so every entity maps onto a flat columnar schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payer master record, one per configured endpoint per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerRecord {
    pub payer_uuid: Uuid,
    pub payer_name: String,
    pub index_url: String,
    pub last_scraped: DateTime<Utc>,
}

/// Billing organization, keyed by TIN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub organization_uuid: Uuid,
    pub tin: String,
    pub organization_name: Option<String>,
    pub npi_count: usize,
    pub is_facility: bool,
    pub created_at: DateTime<Utc>,
}

/// Individual provider, keyed by NPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_uuid: Uuid,
    pub npi: String,
    pub organization_uuid: Uuid,
    pub primary_specialty: Option<String>,
    pub secondary_specialties: Vec<String>,
    pub addresses: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One negotiated rate observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub rate_uuid: Uuid,
    pub payer_uuid: Uuid,
    pub organization_uuid: Uuid,

    /// Procedure code (CPT/HCPCS/…), qualified by `billing_code_type`
    pub service_code: String,
    pub service_description: String,
    pub billing_code_type: String,
    pub negotiated_rate: f64,
    pub billing_class: String,
    pub rate_type: String,

    /// Place-of-service codes the price applies to
    pub service_codes: Vec<String>,

    pub plan_details: PlanDetails,
    pub contract_period: ContractPeriod,
    pub provider_network: ProviderNetwork,
    pub data_lineage: DataLineage,
    pub created_at: DateTime<Utc>,
}

/// Plan metadata inherited from the TOC entry that named the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDetails {
    pub plan_name: String,
    pub plan_id: Option<String>,
    pub plan_market_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractPeriod {
    pub effective_date: Option<String>,
    pub expiration_date: Option<String>,
}

/// The provider set a rate was negotiated for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderNetwork {
    pub npi_list: Vec<String>,
    pub npi_count: usize,
}

/// Where a row came from, for reprocessing and audits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLineage {
    pub source_file_url: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub processing_version: String,
}

/// Aggregated market statistics per service code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub analytics_uuid: Uuid,
    pub service_code: String,
    pub geographic_scope: GeographicScope,
    pub market_statistics: MarketStatistics,
    pub computation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicScope {
    pub level: String,
    pub identifier: String,
    pub name: String,
}

impl GeographicScope {
    /// National scope, the only level produced without geocoding enrichment
    pub fn national() -> Self {
        Self {
            level: "National".to_string(),
            identifier: "US".to_string(),
            name: "United States".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStatistics {
    pub rate_observations: usize,
    pub organization_count: usize,
    pub payer_count: usize,
    pub mean_rate: f64,
    pub median_rate: f64,
    pub std_dev: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    /// Coefficient of variation; 0 when the mean is 0
    pub volatility_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks_round_trip_as_json_strings() {
        let details = PlanDetails {
            plan_name: "PPO Standard".to_string(),
            plan_id: Some("H1234".to_string()),
            plan_market_type: Some("group".to_string()),
        };
        let encoded = serde_json::to_string(&details).unwrap();
        let decoded: PlanDetails = serde_json::from_str(&encoded).unwrap();
        assert_eq!(details, decoded);

        let network = ProviderNetwork {
            npi_list: vec!["1234567893".to_string()],
            npi_count: 1,
        };
        let encoded = serde_json::to_string(&network).unwrap();
        let decoded: ProviderNetwork = serde_json::from_str(&encoded).unwrap();
        assert_eq!(network, decoded);
    }

    #[test]
    fn test_national_scope() {
        let scope = GeographicScope::national();
        assert_eq!(scope.level, "National");
        assert_eq!(scope.identifier, "US");
    }
}
