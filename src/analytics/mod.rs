//! End-of-run market analytics
//!
//! Accumulates admitted rates per service code during the run and computes
//! distribution statistics at finalize. Samples are capped per code so a
//! pathological file can't grow the accumulator without bound; when the cap
//! is hit the drop is logged and the percentiles become estimates over the
//! first N observations.

use crate::domain::entities::{AnalyticsRecord, GeographicScope, MarketStatistics};
use crate::identity;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Per-code sample cap
const SAMPLE_CAP: usize = 100_000;

#[derive(Debug, Default)]
struct CodeStats {
    samples: Vec<f64>,
    observations: usize,
    organizations: HashSet<Uuid>,
    payers: HashSet<Uuid>,
    capped_logged: bool,
}

/// Streaming accumulator for one pipeline's analytics
#[derive(Debug, Default)]
pub struct AnalyticsBuilder {
    per_code: HashMap<String, CodeStats>,
}

impl AnalyticsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one admitted rate observation
    pub fn observe(&mut self, service_code: &str, rate: f64, organization: Uuid, payer: Uuid) {
        let stats = self.per_code.entry(service_code.to_string()).or_default();
        stats.observations += 1;
        stats.organizations.insert(organization);
        stats.payers.insert(payer);
        if stats.samples.len() < SAMPLE_CAP {
            stats.samples.push(rate);
        } else if !stats.capped_logged {
            stats.capped_logged = true;
            tracing::warn!(
                service_code,
                cap = SAMPLE_CAP,
                "Analytics sample cap reached; percentiles cover the first observations only"
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.per_code.is_empty()
    }

    /// Computes analytics rows for everything observed
    pub fn finalize(&self) -> Vec<AnalyticsRecord> {
        let scope = GeographicScope::national();
        let now = Utc::now();

        let mut codes: Vec<&String> = self.per_code.keys().collect();
        codes.sort();

        codes
            .into_iter()
            .filter_map(|code| {
                let stats = &self.per_code[code];
                if stats.samples.is_empty() {
                    return None;
                }
                let mut sorted = stats.samples.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

                let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
                let variance = sorted
                    .iter()
                    .map(|r| (r - mean).powi(2))
                    .sum::<f64>()
                    / sorted.len() as f64;
                let std_dev = variance.sqrt();

                Some(AnalyticsRecord {
                    analytics_uuid: identity::analytics_uuid(&scope.identifier, code),
                    service_code: code.clone(),
                    geographic_scope: scope.clone(),
                    market_statistics: MarketStatistics {
                        rate_observations: stats.observations,
                        organization_count: stats.organizations.len(),
                        payer_count: stats.payers.len(),
                        mean_rate: mean,
                        median_rate: percentile(&sorted, 50.0),
                        std_dev,
                        p10: percentile(&sorted, 10.0),
                        p25: percentile(&sorted, 25.0),
                        p75: percentile(&sorted, 75.0),
                        p90: percentile(&sorted, 90.0),
                        p95: percentile(&sorted, 95.0),
                        volatility_score: if mean > 0.0 { std_dev / mean } else { 0.0 },
                    },
                    computation_date: now,
                })
            })
            .collect()
    }
}

/// Linear-interpolated percentile over a sorted sample
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let weight = rank - low as f64;
        sorted[low] * (1.0 - weight) + sorted[high] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolation() {
        let sorted = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 100.0), 40.0);
        assert_eq!(percentile(&sorted, 50.0), 25.0);
        assert_eq!(percentile(&[42.0], 90.0), 42.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_observe_and_finalize() {
        let payer = identity::payer_uuid("test");
        let org_a = identity::organization_uuid("12-3456789");
        let org_b = identity::organization_uuid("98-7654321");

        let mut builder = AnalyticsBuilder::new();
        builder.observe("99213", 80.0, org_a, payer);
        builder.observe("99213", 100.0, org_b, payer);
        builder.observe("99213", 120.0, org_a, payer);
        builder.observe("99214", 150.0, org_a, payer);

        let records = builder.finalize();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.service_code, "99213");
        assert_eq!(first.market_statistics.rate_observations, 3);
        assert_eq!(first.market_statistics.organization_count, 2);
        assert_eq!(first.market_statistics.payer_count, 1);
        assert_eq!(first.market_statistics.mean_rate, 100.0);
        assert_eq!(first.market_statistics.median_rate, 100.0);
        assert!(first.market_statistics.volatility_score > 0.0);

        assert_eq!(records[1].service_code, "99214");
        assert_eq!(records[1].market_statistics.median_rate, 150.0);
    }

    #[test]
    fn test_analytics_uuid_stable() {
        let payer = identity::payer_uuid("test");
        let org = identity::organization_uuid("12-3456789");

        let run = || {
            let mut b = AnalyticsBuilder::new();
            b.observe("99213", 80.0, org, payer);
            b.finalize()[0].analytics_uuid
        };
        assert_eq!(run(), run());
    }
}
