//! Runtime configuration from environment variables, optionally seeded
//! from a `.env` file. Defaults target the public IRI maproom.

use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::client::{Credentials, Endpoints};
use crate::models::maproom::RegionKey;
use crate::services::fewsnet::IpcFilter;
use crate::services::regions::RegionFilter;
use crate::services::tables::TriggerTableRequest;
use crate::utils::{issue_month, split_list};

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OUTPUT_HTML: &str = "trigger_dashboard.html";
pub const DEFAULT_IPC_OUTPUT_HTML: &str = "ipc_summary.html";

#[derive(Debug, Clone)]
pub struct Config {
    pub maproom: String,
    /// Admin level of the regions, also sent as `mode`.
    pub mode: u32,
    pub season: String,
    pub predictor: String,
    pub predictand: String,
    /// Year shown by the design-tool link.
    pub year: i32,
    /// 0-based issue months.
    pub issue_months: Vec<u32>,
    /// Trigger frequencies in percent.
    pub frequencies: Vec<u32>,
    pub include_upcoming: bool,
    pub threshold_protocol: f64,
    pub credentials: Credentials,
    pub region_filter: RegionFilter,
    pub endpoints: Endpoints,
    pub fewsnet_country_code: String,
    pub http_timeout: Duration,
    pub output_html: PathBuf,
    /// Also run the FEWS NET IPC summary.
    pub ipc_enabled: bool,
    pub ipc_output_html: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let maproom = get("MAPROOM").ok_or_else(|| "Missing MAPROOM (e.g. `madagascar`)".to_string())?;

        let issue_months = parse_list::<u32>("ISSUE_MONTHS", get("ISSUE_MONTHS"))?;
        if issue_months.is_empty() {
            return Err("ISSUE_MONTHS must list at least one 0-based month".to_string());
        }
        if let Some(bad) = issue_months.iter().find(|m| issue_month(**m).is_none()) {
            return Err(format!("ISSUE_MONTHS entry {} is outside 0..=11", bad));
        }

        let frequencies = parse_list::<u32>("FREQUENCIES", get("FREQUENCIES"))?;
        if frequencies.is_empty() {
            return Err("FREQUENCIES must list at least one percentage".to_string());
        }

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            maproom_api: trim_base(get_or("MAPROOM_API_URL", &defaults.maproom_api)),
            design_tool: trim_base(get_or("DESIGN_TOOL_URL", &defaults.design_tool)),
            fewsnet_api: trim_base(get_or("FEWSNET_API_URL", &defaults.fewsnet_api)),
        };

        Ok(Config {
            maproom,
            mode: parse_or("MODE", get("MODE"), 1)?,
            season: get_or("SEASON", "season1"),
            predictor: get_or("PREDICTOR", "pnep"),
            predictand: get_or("PREDICTAND", "bad-years"),
            year: parse_or("YEAR", get("YEAR"), Utc::now().year())?,
            issue_months,
            frequencies,
            include_upcoming: parse_flag("INCLUDE_UPCOMING", get("INCLUDE_UPCOMING"), false)?,
            threshold_protocol: parse_finite("THRESHOLD_PROTOCOL", get("THRESHOLD_PROTOCOL"), 0.0)?,
            credentials: Credentials::new(get_or("IRI_USERNAME", ""), get_or("IRI_PASSWORD", "")),
            region_filter: RegionFilter {
                need_valid_keys: parse_flag("NEED_VALID_KEYS", get("NEED_VALID_KEYS"), false)?,
                valid_keys: get("VALID_KEYS")
                    .map(|raw| split_list(&raw).into_iter().map(RegionKey).collect())
                    .unwrap_or_default(),
            },
            endpoints,
            fewsnet_country_code: get_or("FEWSNET_COUNTRY_CODE", "MG"),
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            output_html: PathBuf::from(get_or("OUTPUT_HTML", DEFAULT_OUTPUT_HTML)),
            ipc_enabled: parse_flag("IPC_ENABLED", get("IPC_ENABLED"), false)?,
            ipc_output_html: PathBuf::from(get_or("IPC_OUTPUT_HTML", DEFAULT_IPC_OUTPUT_HTML)),
        })
    }

    pub fn trigger_request(&self) -> TriggerTableRequest {
        TriggerTableRequest {
            maproom: self.maproom.clone(),
            mode: self.mode,
            season: self.season.clone(),
            predictor: self.predictor.clone(),
            predictand: self.predictand.clone(),
            year: self.year,
            issue_months: self.issue_months.clone(),
            frequencies: self.frequencies.clone(),
            include_upcoming: self.include_upcoming,
            threshold_protocol: self.threshold_protocol,
            region_filter: self.region_filter.clone(),
        }
    }

    pub fn ipc_filter(&self) -> IpcFilter {
        IpcFilter {
            country_code: self.fewsnet_country_code.clone(),
            ..IpcFilter::default()
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, String> {
    match raw {
        None => Ok(default),
        Some(s) => s.parse::<T>().map_err(|_| format!("{} has an invalid value: {}", key, s)),
    }
}

fn parse_finite(key: &str, raw: Option<String>, default: f64) -> Result<f64, String> {
    let value = parse_or(key, raw, default)?;
    if !value.is_finite() {
        return Err(format!("{} has an invalid value: {}", key, value));
    }
    Ok(value)
}

fn parse_list<T: FromStr>(key: &str, raw: Option<String>) -> Result<Vec<T>, String> {
    let Some(raw) = raw else {
        return Err(format!("Missing {} (comma separated list)", key));
    };
    split_list(&raw)
        .into_iter()
        .map(|s| s.parse::<T>().map_err(|_| format!("{} has an invalid entry: {}", key, s)))
        .collect()
}

fn parse_flag(key: &str, raw: Option<String>, default: bool) -> Result<bool, String> {
    match raw.as_deref() {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "True" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "False" | "no") => Ok(false),
        Some(other) => Err(format!("{} must be true or false, got {}", key, other)),
    }
}

/// Load `KEY=VALUE` lines into the process environment. Variables that are
/// already set are left alone. Returns how many were applied.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut applied = 0;
    for (index, line) in content.lines().enumerate() {
        let Some((key, value)) = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // Single-threaded at this point: logging and the client are not started yet.
            unsafe {
                std::env::set_var(&key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// Parse one `.env` line. Blank lines and comments yield `None`.
pub fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid variable name: {:?}", key));
    }
    Ok(Some((key.to_string(), unquote(raw.trim())?)))
}

fn unquote(raw: &str) -> Result<String, String> {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            // Unquoted values end at an inline comment.
            let value = raw.split(" #").next().unwrap_or_default();
            return Ok(value.trim_end().to_string());
        }
    };
    let double = quote == '"';

    let mut value = String::new();
    let mut escape = false;
    while let Some(ch) = chars.next() {
        if escape {
            value.push(match ch {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            escape = false;
        } else if double && ch == '\\' {
            escape = true;
        } else if ch == quote {
            let rest = chars.as_str().trim();
            if rest.is_empty() || rest.starts_with('#') {
                return Ok(value);
            }
            return Err("unexpected characters after closing quote".to_string());
        } else {
            value.push(ch);
        }
    }
    Err(format!("unterminated {} quoted value", if double { "double" } else { "single" }))
}
