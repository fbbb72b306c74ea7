//! Wire and domain types for the FbF maproom API.
//!
//! The export endpoint returns a loosely shaped JSON object that is handled
//! as `serde_json::Value` by `services::flatten`; only the regions endpoint
//! is modeled here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Administrative region key. Numeric keys on the wire are stringified.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionKey(pub String);

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionKey {
    fn from(value: &str) -> Self {
        RegionKey(value.to_string())
    }
}

impl From<i64> for RegionKey {
    fn from(value: i64) -> Self {
        RegionKey(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub key: RegionKey,
    pub label: String,
}

/// Body of `GET /regions`.
#[derive(Debug, Deserialize)]
pub struct RegionsResponse {
    pub regions: Value,
}

/// Ordered (key, label) pairs for one administrative level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionTable {
    pub regions: Vec<Region>,
}

impl RegionTable {
    /// Accepts either `{"key": .., "label": ..}` objects or `[key, label]`
    /// pairs. Anything else is reported with the offending entry index.
    pub fn from_wire(regions: &Value) -> Result<Self, String> {
        let entries = regions
            .as_array()
            .ok_or_else(|| format!("`regions` is {}, expected an array", json_kind(regions)))?;

        let mut out = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let (key, label) = match entry {
                Value::Object(map) => (map.get("key"), map.get("label")),
                Value::Array(pair) if pair.len() == 2 => (pair.first(), pair.get(1)),
                other => {
                    return Err(format!(
                        "regions[{idx}] is {}, expected a {{key, label}} object or a [key, label] pair",
                        json_kind(other)
                    ));
                }
            };
            let key = key
                .and_then(region_key_from_value)
                .ok_or_else(|| format!("regions[{idx}] has no string or numeric key"))?;
            let label = label
                .and_then(Value::as_str)
                .ok_or_else(|| format!("regions[{idx}] has no string label"))?;
            out.push(Region {
                key,
                label: label.to_string(),
            });
        }
        Ok(RegionTable { regions: out })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn region_key_from_value(value: &Value) -> Option<RegionKey> {
    match value {
        Value::String(s) => Some(RegionKey(s.clone())),
        Value::Number(n) => Some(RegionKey(n.to_string())),
        _ => None,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Everything needed to request one forecast export and derive its trigger row.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastQuery {
    pub maproom: String,
    pub mode: u32,
    pub regions: Vec<RegionKey>,
    pub season: String,
    pub predictor: String,
    pub predictand: String,
    /// Only used by the design-tool link.
    pub year: i32,
    pub issue_month0: u32,
    /// Frequency of triggering, in percent.
    pub freq: u32,
    pub include_upcoming: bool,
    pub threshold_protocol: f64,
}
