//! FEWS NET IPC phase records (`/api/ipcphase/?fields=simple`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// IPC acute food insecurity phase, ordered by severity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Minimal,
    Stressed,
    Crisis,
    Emergency,
    Famine,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Minimal,
        Phase::Stressed,
        Phase::Crisis,
        Phase::Emergency,
        Phase::Famine,
    ];

    /// Values outside the five phase names have no category.
    pub fn from_description(s: &str) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|p| crate::utils::serde_enum_name(p).as_deref() == Some(s.trim()))
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One row of the dataset as served. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpcPhaseRecord {
    pub scenario: Option<String>,
    pub description: Option<String>,
    pub projection_start: Option<String>,
    pub projection_end: Option<String>,
    pub reporting_date: Option<String>,
    pub geographic_unit_full_name: Option<String>,
    pub is_allowing_for_assistance: Option<bool>,
    pub country: Option<String>,
}

/// A record with its dates parsed and its phase coerced to the category domain.
#[derive(Debug, Clone, PartialEq)]
pub struct IpcObservation {
    pub scenario: Option<String>,
    pub phase: Option<Phase>,
    pub projection_start: Option<NaiveDate>,
    pub projection_end: Option<NaiveDate>,
    pub reporting_date: Option<NaiveDate>,
    pub unit_name: String,
    pub allowing_assistance: Option<bool>,
    pub country: Option<String>,
}

impl From<&IpcPhaseRecord> for IpcObservation {
    fn from(r: &IpcPhaseRecord) -> Self {
        IpcObservation {
            scenario: r.scenario.clone(),
            phase: r.description.as_deref().and_then(Phase::from_description),
            projection_start: r.projection_start.as_deref().and_then(parse_date),
            projection_end: r.projection_end.as_deref().and_then(parse_date),
            reporting_date: r.reporting_date.as_deref().and_then(parse_date),
            unit_name: r.geographic_unit_full_name.clone().unwrap_or_default(),
            allowing_assistance: r.is_allowing_for_assistance,
            country: r.country.clone(),
        }
    }
}

/// `YYYY-MM-DD`, optionally followed by a time part. Anything else is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
