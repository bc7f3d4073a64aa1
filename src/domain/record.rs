//! Record types flowing through the synchronization pipeline.
//!
//! Source records are open-shaped: a stable identifier plus an arbitrary bag
//! of pass-through fields. The bag is kept as a flattened serde map so raw
//! snapshots round-trip the source payload unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One inventory record as returned by the source pagination API.
///
/// Only the identifier is typed; everything else passes through untouched.
/// Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartRecord {
    /// Stable source identifier. Records without one are still processed but
    /// skip image enrichment.
    #[serde(
        rename = "partId",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_opt_string_or_number"
    )]
    pub part_id: Option<String>,

    /// Pass-through fields the pipeline does not interpret (except during
    /// destination mapping).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl PartRecord {
    /// Convenience accessor for a pass-through field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// One auxiliary image attached to a record, primary-first ordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartImage {
    /// Storage reference; may be a relative path or an absolute URL.
    #[serde(default)]
    pub location_ref: Option<String>,
    /// Whether this is the record's primary image. The source encodes this
    /// inconsistently (bool, 0/1, "1"), so deserialization is lenient.
    #[serde(default, deserialize_with = "de_flexible_bool")]
    pub is_primary: bool,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "de_trimmed_opt_string")]
    pub extension: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// A source record plus its (possibly empty) ordered image list.
///
/// Created by the enricher, one-to-one with its source record, never mutated
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedPart {
    #[serde(flatten)]
    pub record: PartRecord,
    pub images: Vec<PartImage>,
}

impl EnrichedPart {
    pub fn new(record: PartRecord, images: Vec<PartImage>) -> Self {
        Self { record, images }
    }

    /// Record with an empty image list (enrichment skipped or failed).
    pub fn without_images(record: PartRecord) -> Self {
        Self::new(record, Vec::new())
    }
}

fn de_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts bool, numeric 0/1 and string encodings ("1", "true") for flags.
fn de_flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().is_some_and(truthy))
}

fn de_trimmed_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Shared truthiness rule for loosely encoded flags.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true")
        }
        _ => false,
    }
}
