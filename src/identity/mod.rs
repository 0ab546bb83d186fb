//! Deterministic identity assignment
//!
//! Every canonical entity gets a UUIDv5 derived from its natural key under a
//! fixed project namespace, so that re-running the pipeline over byte-exact
//! inputs reproduces the same identifiers. Derivation is a pure function:
//! inputs are lowercased UTF-8 joined with `|`, and each entity kind gets its
//! own sub-namespace so a TIN can never collide with an NPI of the same
//! spelling.

use uuid::Uuid;

/// Fixed project namespace for all UUIDv5 derivations.
///
/// This constant is part of the public data contract: changing it changes
/// every identifier the pipeline has ever emitted.
pub const PRISM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8f, 0x1a, 0x2b, 0x63, 0x4c, 0x5d, 0x4e, 0x6f, 0x9a, 0x0b, 0x1c, 0x2d, 0x3e, 0x4f, 0x5a,
    0x6b,
]);

/// Entity kinds, each with its own sub-namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Payer,
    Organization,
    Provider,
    Rate,
    Plan,
    Analytics,
}

impl EntityKind {
    fn label(self) -> &'static str {
        match self {
            EntityKind::Payer => "payers",
            EntityKind::Organization => "organizations",
            EntityKind::Provider => "providers",
            EntityKind::Rate => "rates",
            EntityKind::Plan => "plans",
            EntityKind::Analytics => "analytics",
        }
    }

    /// Sub-namespace: UUIDv5 of the kind label under the project namespace
    fn namespace(self) -> Uuid {
        Uuid::new_v5(&PRISM_NAMESPACE, self.label().as_bytes())
    }
}

/// Derives a UUID for an entity kind from its identity components.
///
/// Components are lowercased and joined with `|` before hashing, so callers
/// don't need to worry about case conventions in payer data.
pub fn derive(kind: EntityKind, components: &[&str]) -> Uuid {
    let canonical = components.join("|").to_lowercase();
    Uuid::new_v5(&kind.namespace(), canonical.as_bytes())
}

/// Identity of a payer endpoint
pub fn payer_uuid(payer_name: &str) -> Uuid {
    derive(EntityKind::Payer, &[payer_name])
}

/// Identity of a billing organization. Keyed by TIN only; multiple NPIs map
/// to the same organization.
pub fn organization_uuid(tin: &str) -> Uuid {
    derive(EntityKind::Organization, &[tin])
}

/// Identity of an individual provider, keyed by NPI
pub fn provider_uuid(npi: &str) -> Uuid {
    derive(EntityKind::Provider, &[npi])
}

/// Fingerprint of the plan a rate file belongs to
pub fn plan_fingerprint(plan_name: &str, plan_id: &str, plan_market_type: &str) -> Uuid {
    derive(EntityKind::Plan, &[plan_name, plan_id, plan_market_type])
}

/// Identity of a rate observation.
///
/// The tuple is (payer, organization, service code, billing code type,
/// negotiated rate, billing class, rate type, plan fingerprint). The rate is
/// formatted to two decimal places so float noise doesn't split identities.
#[allow(clippy::too_many_arguments)]
pub fn rate_uuid(
    payer: Uuid,
    organization: Uuid,
    service_code: &str,
    billing_code_type: &str,
    negotiated_rate: f64,
    billing_class: &str,
    rate_type: &str,
    plan: Uuid,
) -> Uuid {
    derive(
        EntityKind::Rate,
        &[
            &payer.to_string(),
            &organization.to_string(),
            service_code,
            billing_code_type,
            &format!("{negotiated_rate:.2}"),
            billing_class,
            rate_type,
            &plan.to_string(),
        ],
    )
}

/// Identity of an analytics row per (scope, service code)
pub fn analytics_uuid(scope: &str, service_code: &str) -> Uuid {
    derive(EntityKind::Analytics, &[scope, service_code])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = organization_uuid("12-3456789");
        let b = organization_uuid("12-3456789");
        assert_eq!(a, b);
    }

    #[test]
    fn test_derivation_is_case_insensitive() {
        assert_eq!(payer_uuid("Centene"), payer_uuid("centene"));
    }

    #[test]
    fn test_kinds_partition_the_space() {
        // The same spelling under different kinds must never collide.
        assert_ne!(
            organization_uuid("123456789"),
            provider_uuid("123456789")
        );
    }

    #[test]
    fn test_rate_uuid_sensitivity() {
        let payer = payer_uuid("centene");
        let org = organization_uuid("12-3456789");
        let plan = plan_fingerprint("ppo", "h1", "group");

        let base = rate_uuid(payer, org, "99213", "CPT", 81.84, "professional", "negotiated", plan);
        let same = rate_uuid(payer, org, "99213", "CPT", 81.84, "professional", "negotiated", plan);
        assert_eq!(base, same);

        let different_rate =
            rate_uuid(payer, org, "99213", "CPT", 81.85, "professional", "negotiated", plan);
        assert_ne!(base, different_rate);

        let different_code =
            rate_uuid(payer, org, "99214", "CPT", 81.84, "professional", "negotiated", plan);
        assert_ne!(base, different_code);
    }

    #[test]
    fn test_rate_rounding_merges_float_noise() {
        let payer = payer_uuid("centene");
        let org = organization_uuid("12-3456789");
        let plan = plan_fingerprint("", "", "");
        let a = rate_uuid(payer, org, "99213", "CPT", 81.840001, "professional", "negotiated", plan);
        let b = rate_uuid(payer, org, "99213", "CPT", 81.84, "professional", "negotiated", plan);
        assert_eq!(a, b);
    }
}
