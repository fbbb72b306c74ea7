use log::{debug, info, warn};

use crate::client::{ApiError, Fetched, Transport, TriggerClient};
use crate::models::maproom::{RegionKey, RegionTable, RegionsResponse};

/// Optional restriction of the regions returned for non-zero levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionFilter {
    pub need_valid_keys: bool,
    pub valid_keys: Vec<RegionKey>,
}

impl RegionFilter {
    /// Level 0 (the whole country) is never filtered.
    pub fn apply(&self, level: u32, table: RegionTable) -> RegionTable {
        if level == 0 || !self.need_valid_keys {
            return table;
        }
        let regions = table
            .regions
            .into_iter()
            .filter(|r| self.valid_keys.contains(&r.key))
            .collect();
        RegionTable { regions }
    }
}

pub fn regions_url(api_base: &str, maproom: &str, level: u32) -> String {
    format!("{}/regions?country={}&level={}", api_base, maproom, level)
}

/// Admin regions of `maproom` at `level`, after the allow-list.
pub fn resolve_regions<T: Transport>(
    client: &TriggerClient<T>,
    maproom: &str,
    level: u32,
    filter: &RegionFilter,
) -> Result<Fetched<RegionTable>, ApiError> {
    let url = regions_url(&client.endpoints().maproom_api, maproom, level);
    let response: RegionsResponse = match client.get_authenticated(&url)? {
        Fetched::Data(r) => r,
        Fetched::NoData(n) => return Ok(Fetched::NoData(n)),
    };

    let table = RegionTable::from_wire(&response.regions)
        .map_err(|message| ApiError::UnexpectedShape { url: url.clone(), message })?;
    let fetched = table.len();
    let table = filter.apply(level, table);
    if table.len() != fetched {
        debug!("Regions: allow-list kept {}/{} region(s)", table.len(), fetched);
    }
    if table.is_empty() {
        warn!("Regions: {} level {} has no usable region; the dashboard will be empty", maproom, level);
    } else {
        info!("Regions: {} level {} has {} region(s)", maproom, level, table.len());
    }
    Ok(Fetched::Data(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Credentials;
    use crate::client::mock::{MockTransport, test_endpoints};

    const REGIONS: &str = r#"{"regions": [{"key": 1, "label": "North"}, {"key": 2, "label": "South"}, {"key": 3, "label": "East"}]}"#;

    fn filter(keys: &[i64]) -> RegionFilter {
        RegionFilter {
            need_valid_keys: true,
            valid_keys: keys.iter().map(|k| RegionKey::from(*k)).collect(),
        }
    }

    fn client(transport: MockTransport) -> TriggerClient<MockTransport> {
        TriggerClient::new(transport, test_endpoints(), Credentials::new("user", "secret"))
    }

    #[test]
    fn allow_list_filters_non_zero_levels() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, REGIONS));
        let table = resolve_regions(&c, "madagascar", 1, &filter(&[1, 3])).expect("ok");
        let labels: Vec<_> = table.data().expect("data").regions.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["North", "East"]);
        assert_eq!(
            c.transport().request_urls(),
            vec!["http://maproom.test/regions?country=madagascar&level=1"]
        );
    }

    #[test]
    fn allow_list_is_ignored_at_level_zero() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, REGIONS));
        let table = resolve_regions(&c, "madagascar", 0, &filter(&[1])).expect("ok");
        assert_eq!(table.data().expect("data").len(), 3);
    }

    #[test]
    fn allow_list_is_ignored_when_not_required() {
        let f = RegionFilter {
            need_valid_keys: false,
            valid_keys: vec![RegionKey::from(1)],
        };
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, REGIONS));
        let table = resolve_regions(&c, "madagascar", 2, &f).expect("ok");
        assert_eq!(table.data().expect("data").len(), 3);
    }

    #[test]
    fn allow_list_can_leave_no_regions() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, REGIONS));
        let table = resolve_regions(&c, "madagascar", 1, &filter(&[99])).expect("ok");
        assert!(table.data().expect("data").is_empty());
    }

    #[test]
    fn non_success_is_no_data() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 500, "oops"));
        let out = resolve_regions(&c, "madagascar", 1, &RegionFilter::default()).expect("no hard error");
        assert!(out.is_no_data());
    }

    #[test]
    fn unexpected_shape_is_an_error() {
        let c = client(MockTransport::new().route("http://maproom.test/regions", 200, r#"{"regions": "none"}"#));
        let err = resolve_regions(&c, "madagascar", 1, &RegionFilter::default()).unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedShape { .. }), "{err}");
    }
}
