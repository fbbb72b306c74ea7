//! Trigger table collection: one forecast row per frequency × month × region.

use log::{info, warn};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::client::{ApiError, Fetched, NoData, Transport, TriggerClient};
use crate::models::maproom::{ForecastQuery, RegionKey};
use crate::services::forecast::{Cell, Column, TriggerRow, fetch_trigger_row};
use crate::services::regions::{RegionFilter, resolve_regions};
use crate::utils::issue_month;

/// A trigger row tagged with the admin region it was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerTable {
    pub admin_name: String,
    pub region_key: RegionKey,
    pub row: TriggerRow,
}

impl TriggerTable {
    /// `Admin Name` followed by the row's own columns.
    pub fn columns(&self) -> Vec<Column> {
        let mut cols = vec![Column::AdminName];
        cols.extend_from_slice(self.row.schema().columns());
        cols
    }

    pub fn cell(&self, column: Column) -> Option<Cell<'_>> {
        match column {
            Column::AdminName => Some(Cell::Text(Cow::Borrowed(&self.admin_name))),
            other => self.row.cell(other),
        }
    }
}

/// `admin{mode}_tables` → table name → row (or why there is none).
pub type TriggerTableCollection = BTreeMap<String, BTreeMap<String, Fetched<TriggerTable>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerTableRequest {
    pub maproom: String,
    pub mode: u32,
    pub season: String,
    pub predictor: String,
    pub predictand: String,
    pub year: i32,
    pub issue_months: Vec<u32>,
    pub frequencies: Vec<u32>,
    pub include_upcoming: bool,
    pub threshold_protocol: f64,
    pub region_filter: RegionFilter,
}

impl TriggerTableRequest {
    fn forecast_query(&self, freq: u32, month: u32, region: &RegionKey) -> ForecastQuery {
        ForecastQuery {
            maproom: self.maproom.clone(),
            mode: self.mode,
            regions: vec![region.clone()],
            season: self.season.clone(),
            predictor: self.predictor.clone(),
            predictand: self.predictand.clone(),
            year: self.year,
            issue_month0: month,
            freq,
            include_upcoming: self.include_upcoming,
            threshold_protocol: self.threshold_protocol,
        }
    }
}

#[derive(Debug)]
pub enum BuildError {
    /// The region list could not be fetched; nothing can be built without it.
    RegionsUnavailable { maproom: String, level: u32, cause: NoData },
    Api(ApiError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::RegionsUnavailable { maproom, level, cause } => {
                write!(f, "regions for {} level {} unavailable: {}", maproom, level, cause)
            }
            BuildError::Api(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for BuildError {
    fn from(value: ApiError) -> Self {
        BuildError::Api(value)
    }
}

pub fn admin_tag(mode: u32) -> String {
    format!("admin{}_tables", mode)
}

pub fn table_name(freq: u32, mode: u32, month: u32, region: &RegionKey) -> String {
    format!("output_freq_{}_mode_{}_month_{}_region_{}_table", freq, mode, month, region)
}

/// Fails only when the request itself is invalid or the region list cannot
/// be used. Per-entry failures are stored as `Fetched::NoData`.
pub fn build_trigger_tables<T: Transport>(
    client: &TriggerClient<T>,
    req: &TriggerTableRequest,
) -> Result<TriggerTableCollection, BuildError> {
    info!(
        "Fetching trigger tables: maproom={} mode={} frequencies={:?} months={:?}",
        req.maproom, req.mode, req.frequencies, req.issue_months
    );
    if let Some(&bad) = req.issue_months.iter().find(|m| issue_month(**m).is_none()) {
        return Err(ApiError::InvalidIssueMonth(bad).into());
    }
    let regions = match resolve_regions(client, &req.maproom, req.mode, &req.region_filter)? {
        Fetched::Data(t) => t,
        Fetched::NoData(cause) => {
            return Err(BuildError::RegionsUnavailable {
                maproom: req.maproom.clone(),
                level: req.mode,
                cause,
            });
        }
    };

    let mut tables = BTreeMap::new();
    for &freq in &req.frequencies {
        for &month in &req.issue_months {
            for region in &regions.regions {
                info!("Region {} {}: freq={}% month={}", region.key, region.label, freq, month);
                let query = req.forecast_query(freq, month, &region.key);
                let entry = fetch_trigger_row(client, &query)?.map(|row| TriggerTable {
                    admin_name: region.label.clone(),
                    region_key: region.key.clone(),
                    row,
                });
                if let Fetched::NoData(n) = &entry {
                    warn!("Region {} {}: no trigger row ({})", region.key, region.label, n.reason);
                }
                tables.insert(table_name(freq, req.mode, month, &region.key), entry);
            }
        }
    }

    let mut collection = TriggerTableCollection::new();
    collection.insert(admin_tag(req.mode), tables);
    Ok(collection)
}

/// Rows that have data, in collection order.
pub fn collect_rows(collection: &TriggerTableCollection) -> Vec<&TriggerTable> {
    collection
        .values()
        .flat_map(|tables| tables.values())
        .filter_map(Fetched::data)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockTransport, test_endpoints};
    use crate::client::{Credentials, NoDataReason};

    const REGIONS: &str = r#"{"regions": [{"key": 1, "label": "North"}, {"key": 2, "label": "South"}]}"#;
    const FORECAST: &str =
        r#"{"threshold": 0.5, "skill": {"accuracy": 0.8}, "records": [{"forecast": 0.3}, {"forecast": 0.7}]}"#;

    fn request() -> TriggerTableRequest {
        TriggerTableRequest {
            maproom: "madagascar".to_string(),
            mode: 1,
            season: "season1".to_string(),
            predictor: "forecast".to_string(),
            predictand: "bad-years".to_string(),
            year: 2024,
            issue_months: vec![8],
            frequencies: vec![30],
            include_upcoming: false,
            threshold_protocol: 0.0,
            region_filter: RegionFilter::default(),
        }
    }

    fn client(transport: MockTransport) -> TriggerClient<MockTransport> {
        TriggerClient::new(transport, test_endpoints(), Credentials::new("user", "secret"))
    }

    #[test]
    fn builds_one_tagged_table_per_region() {
        let c = client(
            MockTransport::new()
                .route("http://maproom.test/regions", 200, REGIONS)
                .route("http://maproom.test/madagascar/export", 200, FORECAST),
        );
        let collection = build_trigger_tables(&c, &request()).expect("build");

        let tables = collection.get("admin1_tables").expect("admin tag present");
        assert_eq!(tables.len(), 2);
        let north = tables
            .get("output_freq_30_mode_1_month_8_region_1_table")
            .and_then(Fetched::data)
            .expect("north row");
        let south = tables
            .get("output_freq_30_mode_1_month_8_region_2_table")
            .and_then(Fetched::data)
            .expect("south row");
        assert_eq!(north.admin_name, "North");
        assert_eq!(south.admin_name, "South");
        assert!(north.row.triggered);
        assert!(south.row.triggered);
        assert_eq!(north.cell(Column::AdminName), Some(Cell::Text("North".into())));
        assert_eq!(north.columns().len(), 9);
    }

    #[test]
    fn iterates_frequency_then_month_then_region() {
        let c = client(
            MockTransport::new()
                .route("http://maproom.test/regions", 200, REGIONS)
                .route("http://maproom.test/madagascar/export", 200, FORECAST),
        );
        let mut req = request();
        req.frequencies = vec![15, 30];
        req.issue_months = vec![7, 8];
        let collection = build_trigger_tables(&c, &req).expect("build");
        assert_eq!(collection["admin1_tables"].len(), 8);

        let exports: Vec<String> = c
            .transport()
            .request_urls()
            .into_iter()
            .filter(|u| u.contains("/export?"))
            .map(|u| {
                let freq = u.split("freq=").nth(1).and_then(|s| s.split('&').next()).unwrap_or("").to_string();
                let month = u.split("issue_month0=").nth(1).and_then(|s| s.split('&').next()).unwrap_or("").to_string();
                let region = u.rsplit("region=").next().unwrap_or("").to_string();
                format!("{freq}/{month}/{region}")
            })
            .collect();
        assert_eq!(
            exports,
            vec!["15/7/1", "15/7/2", "15/8/1", "15/8/2", "30/7/1", "30/7/2", "30/8/1", "30/8/2"]
        );
    }

    #[test]
    fn missing_forecast_is_recorded_without_aborting() {
        let c = client(
            MockTransport::new()
                .route("http://maproom.test/regions", 200, REGIONS)
                .route("http://maproom.test/madagascar/export?season=season1&issue_month0=8&freq=30&predictor=forecast&predictand=bad-years&include_upcoming=false&mode=1&region=1", 500, "")
                .route("http://maproom.test/madagascar/export", 200, FORECAST),
        );
        let collection = build_trigger_tables(&c, &request()).expect("build");
        let tables = &collection["admin1_tables"];
        assert!(tables["output_freq_30_mode_1_month_8_region_1_table"].is_no_data());
        assert_eq!(collect_rows(&collection).len(), 1);
    }

    #[test]
    fn unusable_forecast_for_one_region_keeps_the_others() {
        let c = client(
            MockTransport::new()
                .route("http://maproom.test/regions", 200, REGIONS)
                .route(
                    "http://maproom.test/madagascar/export?season=season1&issue_month0=8&freq=30&predictor=forecast&predictand=bad-years&include_upcoming=false&mode=1&region=1",
                    200,
                    r#"{"threshold": 0.5, "skill": {"accuracy": 0.8}, "records": [{"forecast": 0.3}, {"forecast": null}]}"#,
                )
                .route("http://maproom.test/madagascar/export", 200, FORECAST),
        );
        let collection = build_trigger_tables(&c, &request()).expect("build");
        let tables = &collection["admin1_tables"];

        match &tables["output_freq_30_mode_1_month_8_region_1_table"] {
            Fetched::NoData(n) => assert!(matches!(n.reason, NoDataReason::Unusable(_)), "{n}"),
            Fetched::Data(_) => panic!("null forecast must not produce a row"),
        }
        let rows = collect_rows(&collection);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].admin_name, "South");
        assert_eq!(c.transport().request_urls().len(), 3, "regions plus both exports");
    }

    #[test]
    fn invalid_issue_month_is_rejected_before_any_request() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, REGIONS));
        let mut req = request();
        req.issue_months = vec![8, 12];
        let err = build_trigger_tables(&c, &req).unwrap_err();
        assert!(matches!(err, BuildError::Api(ApiError::InvalidIssueMonth(12))), "{err}");
        assert!(c.transport().request_urls().is_empty());
    }

    #[test]
    fn unavailable_regions_fail_fast() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 403, "forbidden"));
        let err = build_trigger_tables(&c, &request()).unwrap_err();
        assert!(matches!(err, BuildError::RegionsUnavailable { level: 1, .. }), "{err}");
        assert!(err.to_string().contains("http 403"), "{err}");
    }

    #[test]
    fn malformed_regions_fail_fast() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, r#"{"regions": [7]}"#));
        let err = build_trigger_tables(&c, &request()).unwrap_err();
        assert!(matches!(err, BuildError::Api(ApiError::UnexpectedShape { .. })), "{err}");
    }
}
