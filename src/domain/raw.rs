//! Raw payer-side record shapes
//!
//! Serde models for the CMS in-network schema as payers actually publish it.
//! Deserialization is deliberately lenient: scalar-vs-array and
//! number-vs-string disagreements between payers are absorbed here so that
//! handlers only deal with semantic differences. Anything a handler emits
//! must still satisfy these shapes.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of a file's `in_network` array, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInNetworkItem {
    #[serde(default)]
    pub negotiation_arrangement: Option<String>,

    #[serde(default)]
    pub billing_code: String,

    #[serde(default)]
    pub billing_code_type: String,

    #[serde(default)]
    pub billing_code_type_version: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub negotiated_rates: Vec<NegotiatedRate>,

    /// Bundled-arrangement payloads (bcbs_il); carried through untyped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covered_services: Option<Value>,
}

/// A rate group: a set of prices valid for a set of providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedRate {
    /// Inline provider groups
    #[serde(default)]
    pub provider_groups: Vec<ProviderGroup>,

    /// Deferred group ids, resolved against the file's top-level
    /// `provider_references` table
    #[serde(default, deserialize_with = "u64_scalar_or_vec")]
    pub provider_references: Vec<u64>,

    #[serde(default)]
    pub negotiated_prices: Vec<NegotiatedPrice>,
}

/// A single negotiated price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedPrice {
    #[serde(default)]
    pub negotiated_type: String,

    /// Absent or null rates are skipped by the normalizer, not an error
    #[serde(default)]
    pub negotiated_rate: Option<f64>,

    /// CMS place-of-service codes; some payers emit a bare string
    #[serde(default, deserialize_with = "string_scalar_or_vec")]
    pub service_code: Vec<String>,

    #[serde(default)]
    pub billing_class: String,

    #[serde(default)]
    pub expiration_date: String,

    #[serde(default, deserialize_with = "string_scalar_or_vec")]
    pub billing_code_modifier: Vec<String>,
}

/// A provider group: NPIs billing under one TIN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGroup {
    /// NPIs arrive as numbers, strings, scalar or array depending on payer
    #[serde(default, deserialize_with = "npi_scalar_or_vec")]
    pub npi: Vec<String>,

    #[serde(default, deserialize_with = "tin_string_or_object", skip_serializing_if = "Option::is_none")]
    pub tin: Option<RawTin>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_group_name: Option<String>,

    /// Nested providers array, the fallback shape some payers use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<RawProvider>,
}

impl ProviderGroup {
    /// True when the group carries neither direct NPIs nor nested providers
    pub fn is_empty(&self) -> bool {
        self.npi.is_empty() && self.providers.iter().all(|p| p.npi.is_empty())
    }
}

/// Nested provider entry within a provider group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProvider {
    #[serde(default, deserialize_with = "npi_scalar_or_vec")]
    pub npi: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

/// TIN as published: `{"type": "ein", "value": "12-3456789"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTin {
    #[serde(default, rename = "type")]
    pub tin_type: String,

    #[serde(default)]
    pub value: String,
}

/// One entry of a file's top-level `provider_references` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReferenceEntry {
    #[serde(default)]
    pub provider_group_id: u64,

    #[serde(default)]
    pub provider_groups: Vec<ProviderGroup>,

    /// Some payers point at an external group file instead of inlining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

fn string_scalar_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()),
        other => Err(de::Error::custom(format!(
            "expected string or array of strings, got {other}"
        ))),
    }
}

fn npi_scalar_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    fn one(v: Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.into_iter().filter_map(one).collect()),
        v @ (Value::String(_) | Value::Number(_)) => Ok(one(v).into_iter().collect()),
        other => Err(de::Error::custom(format!(
            "expected NPI number, string or array, got {other}"
        ))),
    }
}

fn u64_scalar_or_vec<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    fn one(v: &Value) -> Option<u64> {
        v.as_u64()
    }
    match &value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.iter().filter_map(one).collect()),
        Value::Number(_) => Ok(one(&value).into_iter().collect()),
        other => Err(de::Error::custom(format!(
            "expected reference id or array of ids, got {other}"
        ))),
    }
}

fn tin_string_or_object<'de, D>(deserializer: D) -> Result<Option<RawTin>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        // Aetna and Horizon sometimes publish the TIN as a bare string
        Value::String(s) => Ok(Some(RawTin {
            tin_type: "ein".to_string(),
            value: s,
        })),
        obj @ Value::Object(_) => serde_json::from_value(obj)
            .map(Some)
            .map_err(de::Error::custom),
        other => Err(de::Error::custom(format!(
            "expected TIN string or object, got {other}"
        ))),
    }
}
