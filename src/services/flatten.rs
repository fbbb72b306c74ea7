//! Flattening of the maproom export payload.
//!
//! Top-level objects are flattened with `.` (`skill.accuracy`); every
//! list-valued field is exploded into records whose nested objects are
//! flattened with `_`. Scalar and record columns never overlap.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::models::maproom::json_kind;

/// The upstream feed lists the previous season first; the record for the
/// current forecast is the second one.
pub const REPRESENTATIVE_RECORD_INDEX: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    NotAnObject(&'static str),
    /// A column name appears both as a scalar and inside records, or in two list fields.
    ColumnCollision(String),
    TooFewRecords { found: usize, needed: usize },
    MissingField(String),
    NotNumeric { field: String, found: &'static str },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::NotAnObject(kind) => write!(f, "payload is {}, expected an object", kind),
            PayloadError::ColumnCollision(c) => write!(f, "column `{}` appears more than once after flattening", c),
            PayloadError::TooFewRecords { found, needed } => {
                write!(f, "payload has {} forecast record(s), need at least {}", found, needed)
            }
            PayloadError::MissingField(name) => write!(f, "field `{}` missing from payload", name),
            PayloadError::NotNumeric { field, found } => write!(f, "field `{}` is {}, expected a number", field, found),
        }
    }
}

impl std::error::Error for PayloadError {}

/// One exploded list element, columns in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    fn insert(&mut self, name: String, value: Value) -> Result<(), PayloadError> {
        if self.get(&name).is_some() {
            return Err(PayloadError::ColumnCollision(name));
        }
        self.fields.push((name, value));
        Ok(())
    }

    pub fn number(&self, name: &str) -> Result<f64, PayloadError> {
        let value = self.get(name).ok_or_else(|| PayloadError::MissingField(name.to_string()))?;
        as_number(name, value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedPayload {
    /// Non-nested fields in payload order.
    pub scalars: Vec<(String, Value)>,
    pub records: Vec<Record>,
}

impl FlattenedPayload {
    pub fn scalar_columns(&self) -> impl Iterator<Item = &str> {
        self.scalars.iter().map(|(k, _)| k.as_str())
    }

    /// Distinct record columns in first-seen order.
    pub fn record_columns(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for col in self.records.iter().flat_map(Record::columns) {
            if seen.insert(col) {
                out.push(col);
            }
        }
        out
    }

    pub fn representative_record(&self) -> Result<&Record, PayloadError> {
        self.records
            .get(REPRESENTATIVE_RECORD_INDEX)
            .ok_or(PayloadError::TooFewRecords {
                found: self.records.len(),
                needed: REPRESENTATIVE_RECORD_INDEX + 1,
            })
    }
}

pub fn flatten_payload(payload: &Value) -> Result<FlattenedPayload, PayloadError> {
    let object = payload.as_object().ok_or(PayloadError::NotAnObject(json_kind(payload)))?;

    let mut columns = Vec::new();
    flatten_object(object, "", '.', &mut columns);

    let mut out = FlattenedPayload::default();
    for (name, value) in columns {
        match value {
            Value::Array(items) => explode_into(&name, &items, &mut out.records)?,
            scalar => out.scalars.push((name, scalar)),
        }
    }

    let scalar_names: BTreeSet<&str> = out.scalar_columns().collect();
    if let Some(clash) = out.record_columns().into_iter().find(|c| scalar_names.contains(c)) {
        return Err(PayloadError::ColumnCollision(clash.to_string()));
    }
    Ok(out)
}

fn flatten_object(object: &Map<String, Value>, prefix: &str, sep: char, out: &mut Vec<(String, Value)>) {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{sep}{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_object(inner, &name, sep, out),
            other => out.push((name, other.clone())),
        }
    }
}

/// Element `i` of the list lands in `records[i]`, side by side with what
/// earlier list fields put there.
fn explode_into(field: &str, items: &[Value], records: &mut Vec<Record>) -> Result<(), PayloadError> {
    if records.len() < items.len() {
        records.resize_with(items.len(), Record::default);
    }
    for (item, record) in items.iter().zip(records.iter_mut()) {
        match item {
            Value::Object(map) => {
                let mut cols = Vec::new();
                flatten_object(map, "", '_', &mut cols);
                for (name, value) in cols {
                    record.insert(name, value)?;
                }
            }
            scalar => record.insert(field.to_string(), scalar.clone())?,
        }
    }
    Ok(())
}

pub(crate) fn as_number(field: &str, value: &Value) -> Result<f64, PayloadError> {
    value.as_f64().ok_or_else(|| PayloadError::NotNumeric {
        field: field.to_string(),
        found: json_kind(value),
    })
}
