//! FEWS NET IPC phase filter and aggregation.
//!
//! Independent of the trigger tables: downloads the country's IPC
//! classifications, keeps current-situation rows for a season window and a
//! set of regions, and counts phases.

use chrono::{Datelike, NaiveDate};
use log::info;
use std::collections::BTreeMap;

use crate::client::{ApiError, Fetched, Transport, TriggerClient};
use crate::models::fewsnet::{IpcObservation, IpcPhaseRecord, Phase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcFilter {
    pub country_code: String,
    /// Calendar months, 1 = January.
    pub months: Vec<u32>,
    pub years: Vec<i32>,
    pub scenario: String,
    /// Matched as substrings of the unit name; the first match names the region.
    pub regions: Vec<String>,
}

impl Default for IpcFilter {
    fn default() -> Self {
        IpcFilter {
            country_code: "MG".to_string(),
            months: vec![10, 11, 12, 1, 2],
            years: vec![2023, 2024],
            scenario: "CS".to_string(),
            regions: ["Atsimo-Atsinanana", "Anosy", "Atsimo-Andrefana", "Androy"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionalObservation {
    pub region: String,
    pub observation: IpcObservation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownRow {
    pub region: String,
    pub allowing_assistance: bool,
    /// Indexed by `Phase::index`.
    pub counts: [usize; 5],
}

#[derive(Debug, Clone, PartialEq)]
pub struct IpcSummary {
    pub country: Option<String>,
    pub total_records: usize,
    /// Records lacking a parsable projection start or end.
    pub undated_records: usize,
    pub kept: usize,
    pub latest_reporting_date: Option<NaiveDate>,
    /// Every phase, most frequent first.
    pub phase_counts: Vec<(Phase, usize)>,
    pub region_counts: Vec<(String, usize)>,
    pub breakdown: Vec<BreakdownRow>,
}

pub fn ipc_url(fewsnet_base: &str, country_code: &str) -> String {
    format!(
        "{}/api/ipcphase/?format=json&country_code={}&fields=simple",
        fewsnet_base, country_code
    )
}

/// Download and summarize. The dataset is public, so no credentials are sent.
pub fn run_ipc_job<T: Transport>(
    client: &TriggerClient<T>,
    filter: &IpcFilter,
) -> Result<Fetched<IpcSummary>, ApiError> {
    let url = ipc_url(&client.endpoints().fewsnet_api, &filter.country_code);
    let records: Vec<IpcPhaseRecord> = match client.get_anonymous(&url)? {
        Fetched::Data(r) => r,
        Fetched::NoData(n) => return Ok(Fetched::NoData(n)),
    };
    info!("IPC: downloaded {} record(s) for {}", records.len(), filter.country_code);

    let observations: Vec<IpcObservation> = records.iter().map(IpcObservation::from).collect();
    let kept = filter_observations(&observations, filter);
    info!("IPC: {} record(s) match the season window, scenario and regions", kept.len());
    Ok(Fetched::Data(summarize(&observations, &kept)))
}

pub fn filter_observations(observations: &[IpcObservation], filter: &IpcFilter) -> Vec<RegionalObservation> {
    observations
        .iter()
        .filter(|o| match (o.projection_start, o.projection_end) {
            (Some(start), Some(end)) => {
                window_overlaps(start, end, &filter.months)
                    && (filter.years.contains(&start.year()) || filter.years.contains(&end.year()))
            }
            _ => false,
        })
        .filter(|o| o.scenario.as_deref() == Some(filter.scenario.as_str()))
        .filter_map(|o| {
            let region = filter.regions.iter().find(|r| o.unit_name.contains(r.as_str()))?;
            Some(RegionalObservation {
                region: region.clone(),
                observation: o.clone(),
            })
        })
        .collect()
}

/// True if any calendar month from `start` through `end` is in `months`,
/// following the window across year boundaries.
pub fn window_overlaps(start: NaiveDate, end: NaiveDate, months: &[u32]) -> bool {
    let first = start.year() * 12 + start.month0() as i32;
    let last = end.year() * 12 + end.month0() as i32;
    if last < first {
        return false;
    }
    if last - first >= 11 {
        return !months.is_empty();
    }
    (first..=last).any(|m| months.contains(&(m.rem_euclid(12) as u32 + 1)))
}

pub fn summarize(all: &[IpcObservation], kept: &[RegionalObservation]) -> IpcSummary {
    let mut phase_totals = [0usize; 5];
    let mut regions: BTreeMap<&str, usize> = BTreeMap::new();
    let mut breakdown: BTreeMap<(&str, bool), [usize; 5]> = BTreeMap::new();

    for k in kept {
        *regions.entry(k.region.as_str()).or_default() += 1;
        let Some(phase) = k.observation.phase else { continue };
        phase_totals[phase.index()] += 1;
        if let Some(assist) = k.observation.allowing_assistance {
            breakdown.entry((k.region.as_str(), assist)).or_default()[phase.index()] += 1;
        }
    }

    let mut phase_counts: Vec<(Phase, usize)> = Phase::ALL.into_iter().map(|p| (p, phase_totals[p.index()])).collect();
    phase_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut region_counts: Vec<(String, usize)> = regions.into_iter().map(|(r, n)| (r.to_string(), n)).collect();
    region_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    IpcSummary {
        country: all.iter().find_map(|o| o.country.clone()),
        total_records: all.len(),
        undated_records: all
            .iter()
            .filter(|o| o.projection_start.is_none() || o.projection_end.is_none())
            .count(),
        kept: kept.len(),
        latest_reporting_date: kept.iter().filter_map(|k| k.observation.reporting_date).max(),
        phase_counts,
        region_counts,
        breakdown: breakdown
            .into_iter()
            .map(|((region, allowing_assistance), counts)| BreakdownRow {
                region: region.to_string(),
                allowing_assistance,
                counts,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Credentials;
    use crate::client::mock::{MockTransport, test_endpoints};

    fn fixture_body() -> String {
        std::fs::read_to_string("tests/data/ipcphase.json").expect("fixture present")
    }

    fn fixture() -> Vec<IpcObservation> {
        let records: Vec<IpcPhaseRecord> = serde_json::from_str(&fixture_body()).expect("parse ipc fixture");
        records.iter().map(IpcObservation::from).collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_overlap_follows_year_boundary() {
        let season = [10, 11, 12, 1, 2];
        assert!(window_overlaps(date(2023, 11, 1), date(2024, 2, 29), &season));
        assert!(window_overlaps(date(2024, 2, 1), date(2024, 5, 31), &season));
        assert!(!window_overlaps(date(2023, 6, 1), date(2023, 9, 30), &season));
        assert!(!window_overlaps(date(2024, 3, 1), date(2023, 12, 1), &season), "inverted window");
        assert!(window_overlaps(date(2021, 3, 1), date(2023, 3, 1), &season));
    }

    #[test]
    fn filter_keeps_current_situation_rows_in_window_and_regions() {
        let kept = filter_observations(&fixture(), &IpcFilter::default());
        let regions: Vec<_> = kept.iter().map(|k| k.region.as_str()).collect();
        assert_eq!(regions, vec!["Anosy", "Androy", "Atsimo-Atsinanana", "Anosy", "Anosy"]);
        assert!(kept.iter().all(|k| k.observation.scenario.as_deref() == Some("CS")));
    }

    #[test]
    fn summary_counts_phases_regions_and_breakdown() {
        let all = fixture();
        let kept = filter_observations(&all, &IpcFilter::default());
        let summary = summarize(&all, &kept);

        assert_eq!(summary.total_records, 10);
        assert_eq!(summary.undated_records, 1);
        assert_eq!(summary.kept, 5);
        assert_eq!(summary.country.as_deref(), Some("Madagascar"));
        assert_eq!(summary.latest_reporting_date, Some(date(2024, 2, 1)));
        assert_eq!(
            summary.phase_counts,
            vec![
                (Phase::Crisis, 2),
                (Phase::Stressed, 1),
                (Phase::Emergency, 1),
                (Phase::Minimal, 0),
                (Phase::Famine, 0),
            ]
        );
        assert_eq!(
            summary.region_counts,
            vec![
                ("Anosy".to_string(), 3),
                ("Androy".to_string(), 1),
                ("Atsimo-Atsinanana".to_string(), 1),
            ]
        );
        assert_eq!(
            summary.breakdown,
            vec![
                BreakdownRow {
                    region: "Androy".to_string(),
                    allowing_assistance: true,
                    counts: [0, 0, 0, 1, 0],
                },
                BreakdownRow {
                    region: "Anosy".to_string(),
                    allowing_assistance: false,
                    counts: [0, 1, 1, 0, 0],
                },
                BreakdownRow {
                    region: "Atsimo-Atsinanana".to_string(),
                    allowing_assistance: false,
                    counts: [0, 0, 1, 0, 0],
                },
            ]
        );
    }

    #[test]
    fn job_fetches_anonymously_and_summarizes() {
        let client = TriggerClient::new(
            MockTransport::new().route("https://fews.test/api/ipcphase/", 200, fixture_body()),
            test_endpoints(),
            Credentials::new("user", "secret"),
        );
        let summary = run_ipc_job(&client, &IpcFilter::default()).expect("job");
        assert_eq!(summary.data().map(|s| s.kept), Some(5));
        assert_eq!(
            client.transport().requests.borrow()[0],
            (
                "https://fews.test/api/ipcphase/?format=json&country_code=MG&fields=simple".to_string(),
                false
            )
        );
    }

    #[test]
    fn job_failure_is_no_data() {
        let client = TriggerClient::new(
            MockTransport::new().route("https://fews.test/", 502, "bad gateway"),
            test_endpoints(),
            Credentials::default(),
        );
        assert!(run_ipc_job(&client, &IpcFilter::default()).expect("no hard error").is_no_data());
    }
}
