//! Forecast export fetch and trigger-row derivation.

use chrono::Month;
use log::{debug, warn};
use serde_json::Value;
use std::borrow::Cow;

use crate::client::{ApiError, Endpoints, Fetched, NoData, NoDataReason, Transport, TriggerClient};
use crate::models::maproom::ForecastQuery;
use crate::services::flatten::{PayloadError, as_number, flatten_payload};
use crate::utils::{issue_month, month_abbrev};

const THRESHOLD_FIELD: &str = "threshold";
const ACCURACY_FIELD: &str = "skill.accuracy";
const THRESHOLD_METRIC: &str = "Forecast Threshold";
const ACCURACY_METRIC: &str = "Forecast Accuracy";

/// Presentation columns, in the order they can appear in a table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    AdminName,
    Frequency,
    IssueMonth,
    Forecast,
    ForecastThreshold,
    TriggerDifference,
    ForecastAccuracyPct,
    Triggered,
    AdjustedThreshold,
    ThresholdProtocol,
    TriggeredAdjusted,
    DesignToolUrl,
}

impl Column {
    pub fn header(self) -> &'static str {
        match self {
            Column::AdminName => "Admin Name",
            Column::Frequency => "Frequency (%)",
            Column::IssueMonth => "Issue Month",
            Column::Forecast => "Forecast",
            Column::ForecastThreshold => "Forecast Threshold",
            Column::TriggerDifference => "Trigger Difference",
            Column::ForecastAccuracyPct => "Forecast Accuracy (%)",
            Column::Triggered => "Triggered",
            Column::AdjustedThreshold => "Adjusted Forecast Threshold",
            Column::ThresholdProtocol => "Threshold Protocol",
            Column::TriggeredAdjusted => "Triggered Adjusted",
            Column::DesignToolUrl => "Design Tool URL",
        }
    }
}

/// Column layout of a trigger row, chosen by the threshold protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Schema {
    /// Protocol offset of zero: no adjusted-threshold columns.
    Standard,
    Adjusted,
}

const STANDARD_COLUMNS: [Column; 8] = [
    Column::Frequency,
    Column::IssueMonth,
    Column::Forecast,
    Column::ForecastThreshold,
    Column::TriggerDifference,
    Column::ForecastAccuracyPct,
    Column::Triggered,
    Column::DesignToolUrl,
];

const ADJUSTED_COLUMNS: [Column; 11] = [
    Column::Frequency,
    Column::IssueMonth,
    Column::Forecast,
    Column::ForecastThreshold,
    Column::TriggerDifference,
    Column::ForecastAccuracyPct,
    Column::Triggered,
    Column::AdjustedThreshold,
    Column::ThresholdProtocol,
    Column::TriggeredAdjusted,
    Column::DesignToolUrl,
];

impl Schema {
    pub fn for_protocol(threshold_protocol: f64) -> Self {
        if threshold_protocol == 0.0 {
            Schema::Standard
        } else {
            Schema::Adjusted
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Schema::Standard => &STANDARD_COLUMNS,
            Schema::Adjusted => &ADJUSTED_COLUMNS,
        }
    }
}

/// A single value ready for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<'a> {
    Text(Cow<'a, str>),
    Number(f64),
    /// Already scaled to 0..100.
    Percent(f64),
    Flag(bool),
    /// Trusted HTML, emitted without escaping.
    Markup(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRow {
    pub frequency: u32,
    pub issue_month: Month,
    pub forecast: f64,
    pub forecast_threshold: f64,
    pub trigger_difference: f64,
    pub forecast_accuracy: f64,
    pub triggered: bool,
    pub adjusted_threshold: f64,
    pub threshold_protocol: f64,
    /// Compared against the unadjusted threshold, same as `triggered`.
    pub triggered_adjusted: bool,
    pub design_tool_link: String,
}

impl TriggerRow {
    pub fn schema(&self) -> Schema {
        Schema::for_protocol(self.threshold_protocol)
    }

    pub fn forecast_accuracy_pct(&self) -> f64 {
        self.forecast_accuracy * 100.0
    }

    /// Value for `column`, or `None` when the column is not part of this row.
    pub fn cell(&self, column: Column) -> Option<Cell<'_>> {
        if !self.schema().columns().contains(&column) {
            return None;
        }
        let cell = match column {
            Column::AdminName => return None,
            Column::Frequency => Cell::Text(Cow::Owned(format!("{}%", self.frequency))),
            Column::IssueMonth => Cell::Text(Cow::Borrowed(month_abbrev(self.issue_month))),
            Column::Forecast => Cell::Number(self.forecast),
            Column::ForecastThreshold => Cell::Number(self.forecast_threshold),
            Column::TriggerDifference => Cell::Number(self.trigger_difference),
            Column::ForecastAccuracyPct => Cell::Percent(self.forecast_accuracy_pct()),
            Column::Triggered => Cell::Flag(self.triggered),
            Column::AdjustedThreshold => Cell::Number(self.adjusted_threshold),
            Column::ThresholdProtocol => Cell::Text(Cow::Owned(format!("{}", self.threshold_protocol))),
            Column::TriggeredAdjusted => Cell::Flag(self.triggered_adjusted),
            Column::DesignToolUrl => Cell::Markup(&self.design_tool_link),
        };
        Some(cell)
    }
}

pub fn export_url(endpoints: &Endpoints, q: &ForecastQuery) -> String {
    let regions = q.regions.iter().map(|r| r.0.as_str()).collect::<Vec<_>>().join(",");
    format!(
        "{base}/{maproom}/export?season={season}&issue_month0={month}&freq={freq}&predictor={predictor}\
         &predictand={predictand}&include_upcoming={upcoming}&mode={mode}&region={regions}",
        base = endpoints.maproom_api,
        maproom = q.maproom,
        season = q.season,
        month = q.issue_month0,
        freq = q.freq,
        predictor = q.predictor,
        predictand = q.predictand,
        upcoming = q.include_upcoming,
        mode = q.mode,
        regions = regions,
    )
}

/// Human-facing link to the maproom design tool. Never fetched.
pub fn design_tool_url(endpoints: &Endpoints, q: &ForecastQuery) -> String {
    format!(
        "{base}/{maproom}?mode={mode}&map_column={predictor}&season={season}&predictors={predictor}\
         &predictand={predictand}&year={year}&issue_month0={month}&freq={freq}&severity=0\
         &include_upcoming={upcoming}",
        base = endpoints.design_tool,
        maproom = q.maproom,
        mode = q.mode,
        predictor = q.predictor,
        season = q.season,
        predictand = q.predictand,
        year = q.year,
        month = q.issue_month0,
        freq = q.freq,
        upcoming = q.include_upcoming,
    )
}

pub fn design_tool_link(tool_url: &str) -> String {
    format!("<a href='{}'>Design Tool Link</a>", tool_url)
}

/// Fetch the export for one region/month/frequency and derive its trigger row.
///
/// A body that is not JSON, or a payload the row cannot be derived from, is
/// `NoDataReason::Unusable`. Only an invalid issue month is an error.
pub fn fetch_trigger_row<T: Transport>(
    client: &TriggerClient<T>,
    query: &ForecastQuery,
) -> Result<Fetched<TriggerRow>, ApiError> {
    let month = issue_month(query.issue_month0).ok_or(ApiError::InvalidIssueMonth(query.issue_month0))?;
    let url = export_url(client.endpoints(), query);
    let tool_url = design_tool_url(client.endpoints(), query);

    let payload: Value = match client.get_authenticated(&url) {
        Ok(Fetched::Data(v)) => v,
        Ok(Fetched::NoData(n)) => return Ok(Fetched::NoData(n)),
        Err(ApiError::Decode { source, .. }) => return Ok(unusable(url, format!("json error: {}", source))),
        Err(e) => return Err(e),
    };
    let row = match derive_trigger_row(&payload, query, month, &tool_url) {
        Ok(row) => row,
        Err(e) => return Ok(unusable(url, format!("forecast payload error: {}", e))),
    };
    debug!(
        "{} month={} freq={}%: forecast={} threshold={} triggered={}",
        query.maproom,
        month_abbrev(month),
        query.freq,
        row.forecast,
        row.forecast_threshold,
        row.triggered
    );
    Ok(Fetched::Data(row))
}

fn unusable<D>(url: String, message: String) -> Fetched<D> {
    warn!("GET {} returned an unusable forecast: {}", url, message);
    Fetched::NoData(NoData {
        url,
        reason: NoDataReason::Unusable(message),
    })
}

/// Turn an export payload into the presentation row.
pub fn derive_trigger_row(
    payload: &Value,
    query: &ForecastQuery,
    month: Month,
    tool_url: &str,
) -> Result<TriggerRow, PayloadError> {
    let flat = flatten_payload(payload)?;

    // Only the first two scalars are metrics; later ones are ignored.
    let metrics: Vec<(&str, &Value)> = flat
        .scalars
        .iter()
        .take(2)
        .map(|(name, value)| (metric_name(name), value))
        .collect();
    let metric = |wanted: &str| -> Result<f64, PayloadError> {
        let (_, value) = metrics
            .iter()
            .find(|(name, _)| *name == wanted)
            .ok_or_else(|| PayloadError::MissingField(wanted.to_string()))?;
        as_number(wanted, value)
    };
    let threshold = metric(THRESHOLD_METRIC)?;
    let accuracy = metric(ACCURACY_METRIC)?;

    let forecast = flat.representative_record()?.number(&query.predictor)?;

    Ok(TriggerRow {
        frequency: query.freq,
        issue_month: month,
        forecast,
        forecast_threshold: threshold,
        trigger_difference: forecast - threshold,
        forecast_accuracy: accuracy,
        triggered: forecast > threshold,
        adjusted_threshold: threshold + query.threshold_protocol,
        threshold_protocol: query.threshold_protocol,
        triggered_adjusted: forecast > threshold,
        design_tool_link: design_tool_link(tool_url),
    })
}

fn metric_name(field: &str) -> &str {
    match field {
        THRESHOLD_FIELD => THRESHOLD_METRIC,
        ACCURACY_FIELD => ACCURACY_METRIC,
        other => other,
    }
}
