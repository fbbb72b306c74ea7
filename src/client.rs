//! Blocking HTTP access to the maproom and FEWS NET APIs.
//!
//! - `Transport` is the seam between request logic and the wire; the
//!   production implementation wraps a shared `ureq::Agent`.
//! - Non-success statuses and transport failures are not errors: they are
//!   logged once at the call site and surface as `Fetched::NoData`.
//! - Decode failures and unexpected payload shapes are `ApiError`s. Callers
//!   fetching one entry of a larger table turn them into
//!   `NoDataReason::Unusable` instead.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::StatusCode;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// Upper bound for a single response body. The IPC dataset for a whole
/// country is several megabytes.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug)]
pub enum ApiError {
    /// The body was not valid JSON for the expected type.
    Decode {
        url: String,
        source: serde_path_to_error::Error<serde_json::Error>,
    },
    /// The body decoded but its structure is not one we know how to read.
    UnexpectedShape { url: String, message: String },
    /// Issue months are 0-based and must lie in `0..=11`.
    InvalidIssueMonth(u32),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Decode { url, source } => write!(f, "json error from {}: {}", url, source),
            ApiError::UnexpectedShape { url, message } => {
                write!(f, "unexpected response shape from {}: {}", url, message)
            }
            ApiError::InvalidIssueMonth(m) => write!(f, "issue month {} is outside 0..=11", m),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why a request produced no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoDataReason {
    Status(StatusCode),
    Transport(String),
    /// The response arrived but could not be turned into a row.
    Unusable(String),
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoDataReason::Status(s) => write!(f, "http {}", s.as_u16()),
            NoDataReason::Transport(e) => write!(f, "transport error: {}", e),
            NoDataReason::Unusable(e) => write!(f, "unusable response: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoData {
    pub url: String,
    pub reason: NoDataReason,
}

impl fmt::Display for NoData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no data from {} ({})", self.url, self.reason)
    }
}

/// Outcome of a fetch that tolerates remote failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    NoData(NoData),
}

impl<T> Fetched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Data(v) => Fetched::Data(f(v)),
            Fetched::NoData(n) => Fetched::NoData(n),
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Fetched::Data(v) => Some(v),
            Fetched::NoData(_) => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Fetched::NoData(_))
    }
}

/// Basic-auth credentials. Empty username or password means anonymous.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }

    pub fn authorization_header(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

/// Raw response as seen by the request logic.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

pub trait Transport {
    /// Issue a GET. `Err` carries a transport-level failure description.
    fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<HttpReply, String>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        UreqTransport { agent: config.into() }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<HttpReply, String> {
        let mut req = self.agent.get(url).header("Accept", "application/json");
        if let Some(c) = credentials {
            req = req.header("Authorization", c.authorization_header());
        }
        let mut res = req.call().map_err(|e| e.to_string())?;
        let status = res.status();
        let body = res
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(|e| e.to_string())?;
        Ok(HttpReply { status, body })
    }
}

/// Base URLs of the services we talk to, without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub maproom_api: String,
    pub design_tool: String,
    pub fewsnet_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            maproom_api: "http://iridl.ldeo.columbia.edu/fbfmaproom2".to_string(),
            design_tool: "https://iridl.ldeo.columbia.edu/fbfmaproom2".to_string(),
            fewsnet_api: "https://fdw.fews.net".to_string(),
        }
    }
}

pub struct TriggerClient<T: Transport = UreqTransport> {
    transport: T,
    endpoints: Endpoints,
    credentials: Credentials,
}

impl<T: Transport> TriggerClient<T> {
    pub fn new(transport: T, endpoints: Endpoints, credentials: Credentials) -> Self {
        TriggerClient {
            transport,
            endpoints,
            credentials,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET with the configured credentials, unless they are anonymous.
    pub fn get_authenticated<D: DeserializeOwned>(&self, url: &str) -> Result<Fetched<D>, ApiError> {
        let creds = (!self.credentials.is_anonymous()).then_some(&self.credentials);
        self.get_json(url, creds)
    }

    pub fn get_anonymous<D: DeserializeOwned>(&self, url: &str) -> Result<Fetched<D>, ApiError> {
        self.get_json(url, None)
    }

    fn get_json<D: DeserializeOwned>(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Fetched<D>, ApiError> {
        debug!("GET {} (auth={})", url, credentials.is_some());
        let reply = match self.transport.get(url, credentials) {
            Ok(r) => r,
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                return Ok(Fetched::NoData(NoData {
                    url: url.to_string(),
                    reason: NoDataReason::Transport(e),
                }));
            }
        };

        if !reply.status.is_success() {
            warn!("GET {} returned http {}", url, reply.status.as_u16());
            return Ok(Fetched::NoData(NoData {
                url: url.to_string(),
                reason: NoDataReason::Status(reply.status),
            }));
        }

        let de = &mut serde_json::Deserializer::from_str(&reply.body);
        serde_path_to_error::deserialize(de)
            .map(Fetched::Data)
            .map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            })
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use serde_json::Value;

    #[test]
    fn non_success_status_is_no_data_not_error() {
        let client = TriggerClient::new(
            MockTransport::new().route("http://maproom.test/", 503, "busy"),
            test_endpoints(),
            Credentials::new("user", "secret"),
        );
        let out: Fetched<Value> = client.get_authenticated("http://maproom.test/x").expect("no hard error");
        match out {
            Fetched::NoData(n) => assert_eq!(n.reason, NoDataReason::Status(StatusCode::SERVICE_UNAVAILABLE)),
            Fetched::Data(_) => panic!("expected no data"),
        }
    }

    #[test]
    fn transport_failure_is_no_data() {
        let client = TriggerClient::new(
            MockTransport::new().fail("http://maproom.test/", "connection refused"),
            test_endpoints(),
            Credentials::default(),
        );
        let out: Fetched<Value> = client.get_anonymous("http://maproom.test/x").expect("no hard error");
        assert!(out.is_no_data());
    }

    #[test]
    fn decode_error_names_the_path() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Body {
            items: Vec<u32>,
        }
        let client = TriggerClient::new(
            MockTransport::new().route("http://maproom.test/", 200, r#"{"items": [1, "two"]}"#),
            test_endpoints(),
            Credentials::default(),
        );
        let err = client.get_anonymous::<Body>("http://maproom.test/x").unwrap_err();
        assert!(err.to_string().contains("items[1]"), "{err}");
    }

    #[test]
    fn anonymous_credentials_skip_authorization() {
        let transport = MockTransport::new().route("http://maproom.test/", 200, "{}");
        let client = TriggerClient::new(transport, test_endpoints(), Credentials::new("user", ""));
        let _: Fetched<Value> = client.get_authenticated("http://maproom.test/x").expect("ok");
        assert_eq!(client.transport().requests.borrow()[0], ("http://maproom.test/x".to_string(), false));
    }

    #[test]
    fn basic_authorization_header_is_base64_of_user_and_password() {
        let creds = Credentials::new("Aladdin", "open sesame");
        assert_eq!(creds.authorization_header(), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
        assert!(!format!("{:?}", creds).contains("open sesame"));
    }
}
