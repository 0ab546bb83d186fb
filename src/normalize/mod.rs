//! Record normalization
//!
//! Turns one raw in-network item into zero or more canonical rate rows plus
//! the organizations and providers they reference. Filtering happens here,
//! in a fixed order: billing-code whitelist, rate bounds (global band plus
//! per-code ceilings), recognized billing-code type, then the quality gate.
//! Rejections increment counters and never abort the stream.
//!
//! Entity deduplication is pipeline-scoped: the first sighting of a TIN or
//! NPI emits the row, later sightings only update counters. That ordering is
//! what guarantees every emitted rate references an organization emitted in
//! the same run.

use crate::config::PipelineConfig;
use crate::domain::entities::{
    ContractPeriod, DataLineage, OrganizationRecord, PlanDetails, ProviderNetwork, ProviderRecord,
    RateRecord,
};
use crate::domain::ids::Npi;
use crate::domain::raw::{NegotiatedPrice, ProviderGroup, RawInNetworkItem};
use crate::identity;
use crate::quality::{QualityGate, RowView};
use crate::stream::MrfFile;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Stamped into every row's data lineage
pub const PROCESSING_VERSION: &str = concat!("prism-etl-v", env!("CARGO_PKG_VERSION"));

/// Billing-code vocabularies the canonical model accepts
const RECOGNIZED_CODE_TYPES: [&str; 6] = ["CPT", "HCPCS", "ICD", "MS-DRG", "LOCAL", "CUSTOM"];

/// Rejection and admission counters, tracked per payer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounters {
    pub admitted: u64,
    pub rejected_whitelist: u64,
    pub rejected_bounds: u64,
    pub rejected_code_type: u64,
    pub rejected_completeness: u64,
    pub rejected_accuracy: u64,
    /// Prices with no usable rate value
    pub skipped_no_rate: u64,
    /// Rate groups with no resolvable provider group
    pub skipped_no_provider: u64,
    /// Rows collapsed onto an identity already emitted this run
    pub duplicate_identity: u64,
}

impl RejectionCounters {
    pub fn merge(&mut self, other: &RejectionCounters) {
        self.admitted += other.admitted;
        self.rejected_whitelist += other.rejected_whitelist;
        self.rejected_bounds += other.rejected_bounds;
        self.rejected_code_type += other.rejected_code_type;
        self.rejected_completeness += other.rejected_completeness;
        self.rejected_accuracy += other.rejected_accuracy;
        self.skipped_no_rate += other.skipped_no_rate;
        self.skipped_no_provider += other.skipped_no_provider;
        self.duplicate_identity += other.duplicate_identity;
    }
}

/// Pipeline-scoped deduplication index
///
/// Keys are the natural keys (TIN, NPI) plus emitted rate identities. One
/// index per payer pipeline; never shared across pipelines.
#[derive(Debug, Default)]
pub struct EntityIndex {
    organizations: HashMap<String, Uuid>,
    providers: HashSet<String>,
    rates: HashSet<Uuid>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn rate_count(&self) -> usize {
        self.rates.len()
    }
}

/// Entities produced by normalizing one item
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub rates: Vec<RateRecord>,
    pub organizations: Vec<OrganizationRecord>,
    pub providers: Vec<ProviderRecord>,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty() && self.organizations.is_empty() && self.providers.is_empty()
    }
}

/// Canonicalizes raw in-network items for one payer
pub struct Normalizer {
    payer_uuid: Uuid,
    whitelist: Option<HashSet<String>>,
    min_rate: f64,
    max_rate: f64,
    per_code_ceilings: BTreeMap<String, f64>,
    gate: QualityGate,
}

impl Normalizer {
    pub fn new(payer_uuid: Uuid, config: &PipelineConfig) -> Self {
        let whitelist = if config.cpt_whitelist.is_empty() {
            None
        } else {
            Some(config.cpt_whitelist.iter().cloned().collect())
        };
        Self {
            payer_uuid,
            whitelist,
            min_rate: config.quality_rules.rates.min_rate,
            max_rate: config.quality_rules.rates.max_rate,
            per_code_ceilings: config
                .quality_rules
                .high_cost_procedures
                .max_reasonable_rates
                .clone(),
            gate: QualityGate::new(
                config.processing.min_completeness_pct,
                config.processing.min_accuracy_score,
            ),
        }
    }

    /// Normalizes one raw item into rate/organization/provider rows.
    ///
    /// `references` is the file's resolved provider-reference table (empty
    /// when the file inlines all groups).
    pub fn normalize_item(
        &self,
        item: &RawInNetworkItem,
        file: &MrfFile,
        references: &HashMap<u64, Vec<ProviderGroup>>,
        index: &mut EntityIndex,
        counters: &mut RejectionCounters,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(&item.billing_code) {
                counters.rejected_whitelist += 1;
                return batch;
            }
        }

        let plan = identity::plan_fingerprint(
            &file.plan_name,
            file.plan_id.as_deref().unwrap_or(""),
            file.plan_market_type.as_deref().unwrap_or(""),
        );

        for rate_group in &item.negotiated_rates {
            let groups = self.resolve_groups(rate_group, references, counters);
            if groups.is_empty() {
                continue;
            }

            for price in &rate_group.negotiated_prices {
                let Some(rate) = price.negotiated_rate else {
                    counters.skipped_no_rate += 1;
                    continue;
                };

                if !self.within_bounds(&item.billing_code, rate) {
                    counters.rejected_bounds += 1;
                    continue;
                }

                if !recognized_code_type(&item.billing_code_type) {
                    counters.rejected_code_type += 1;
                    continue;
                }

                for group in &groups {
                    self.emit_row(
                        item, file, plan, group, price, rate, index, counters, &mut batch,
                    );
                }
            }
        }

        batch
    }

    /// Resolves the provider groups a rate group applies to. Deferred
    /// references win over inline groups when both are present.
    fn resolve_groups<'a>(
        &self,
        rate_group: &'a crate::domain::raw::NegotiatedRate,
        references: &'a HashMap<u64, Vec<ProviderGroup>>,
        counters: &mut RejectionCounters,
    ) -> Vec<&'a ProviderGroup> {
        let mut groups: Vec<&ProviderGroup> = Vec::new();

        if !rate_group.provider_references.is_empty() {
            for reference in &rate_group.provider_references {
                match references.get(reference) {
                    Some(resolved) => groups.extend(resolved.iter()),
                    None => {
                        tracing::debug!(reference, "Unresolved provider reference");
                    }
                }
            }
        } else {
            groups.extend(rate_group.provider_groups.iter());
        }

        groups.retain(|g| !g.is_empty() && g.tin.is_some());
        if groups.is_empty() {
            counters.skipped_no_provider += 1;
        }
        groups
    }

    fn within_bounds(&self, billing_code: &str, rate: f64) -> bool {
        if !(rate >= self.min_rate && rate <= self.max_rate) {
            return false;
        }
        if let Some(ceiling) = self.per_code_ceilings.get(billing_code) {
            if rate > *ceiling {
                return false;
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_row(
        &self,
        item: &RawInNetworkItem,
        file: &MrfFile,
        plan: Uuid,
        group: &ProviderGroup,
        price: &NegotiatedPrice,
        rate: f64,
        index: &mut EntityIndex,
        counters: &mut RejectionCounters,
        batch: &mut NormalizedBatch,
    ) {
        let tin = group.tin.as_ref().map(|t| t.value.as_str()).unwrap_or("");
        let rate_type = if price.negotiated_type.is_empty() {
            "negotiated"
        } else {
            price.negotiated_type.as_str()
        };

        let verdict = self.gate.score(&RowView {
            service_code: &item.billing_code,
            billing_code_type: &item.billing_code_type,
            negotiated_rate: rate,
            billing_class: &price.billing_class,
            tin: Some(tin),
            npis: &group.npi,
        });
        if !verdict.admitted {
            if verdict.failed_completeness {
                counters.rejected_completeness += 1;
            } else {
                counters.rejected_accuracy += 1;
            }
            tracing::debug!(
                billing_code = %item.billing_code,
                completeness = verdict.completeness,
                accuracy = verdict.accuracy,
                "Row rejected by quality gate"
            );
            return;
        }

        let organization_uuid = identity::organization_uuid(tin);
        let rate_uuid = identity::rate_uuid(
            self.payer_uuid,
            organization_uuid,
            &item.billing_code,
            &item.billing_code_type,
            rate,
            &price.billing_class,
            rate_type,
            plan,
        );

        if !index.rates.insert(rate_uuid) {
            counters.duplicate_identity += 1;
            tracing::debug!(%rate_uuid, billing_code = %item.billing_code, "Duplicate rate identity, keeping first");
            return;
        }

        let now = Utc::now();

        // Organization row on first sight of the TIN, before the rate row
        // that references it.
        if !index.organizations.contains_key(tin) {
            index.organizations.insert(tin.to_string(), organization_uuid);
            batch.organizations.push(OrganizationRecord {
                organization_uuid,
                tin: tin.to_string(),
                organization_name: group.provider_group_name.clone(),
                npi_count: group.npi.len(),
                is_facility: price.billing_class.eq_ignore_ascii_case("facility"),
                created_at: now,
            });
        }

        for npi in &group.npi {
            // Invariant: emitted providers carry well-formed NPIs. Luhn
            // validity is a quality score, not an emission requirement.
            let Ok(parsed) = Npi::new(npi.as_str()) else {
                tracing::debug!(npi = %npi, "Skipping malformed NPI");
                continue;
            };
            if index.providers.insert(npi.clone()) {
                batch.providers.push(ProviderRecord {
                    provider_uuid: identity::provider_uuid(parsed.as_str()),
                    npi: parsed.into_inner(),
                    organization_uuid,
                    primary_specialty: None,
                    secondary_specialties: Vec::new(),
                    addresses: Vec::new(),
                    is_active: true,
                    created_at: now,
                });
            }
        }

        counters.admitted += 1;
        batch.rates.push(RateRecord {
            rate_uuid,
            payer_uuid: self.payer_uuid,
            organization_uuid,
            service_code: item.billing_code.clone(),
            service_description: item.description.clone(),
            billing_code_type: item.billing_code_type.clone(),
            negotiated_rate: rate,
            billing_class: price.billing_class.clone(),
            rate_type: rate_type.to_string(),
            service_codes: price.service_code.clone(),
            plan_details: PlanDetails {
                plan_name: file.plan_name.clone(),
                plan_id: file.plan_id.clone(),
                plan_market_type: file.plan_market_type.clone(),
            },
            contract_period: ContractPeriod {
                effective_date: None,
                expiration_date: if price.expiration_date.is_empty() {
                    None
                } else {
                    Some(price.expiration_date.clone())
                },
            },
            provider_network: ProviderNetwork {
                npi_list: group.npi.clone(),
                npi_count: group.npi.len(),
            },
            data_lineage: DataLineage {
                source_file_url: file.url.clone(),
                extraction_timestamp: now,
                processing_version: PROCESSING_VERSION.to_string(),
            },
            created_at: now,
        });
    }
}

fn recognized_code_type(code_type: &str) -> bool {
    RECOGNIZED_CODE_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(code_type))
}
