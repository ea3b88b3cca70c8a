use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// Kuasark widget API (station info).
pub const STATION_API: &str = "https://kuasark.com/ja/api/widget/stations/pyongyang-radio-fm/";

#[derive(Debug, Error)]
pub enum StationError {
    #[error("station API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("station API HTTP {0}")]
    Status(u16),
    #[error("station API returned invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("station.stream_url not found")]
    MissingStreamUrl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StationInfo {
    pub stream_url: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WidgetResponse {
    station: Option<WidgetStation>,
}

#[derive(Debug, Deserialize)]
struct WidgetStation {
    stream_url: Option<String>,
    name: Option<String>,
}

/// Anything that can resolve the station's stream URL.
pub trait StationSource {
    fn fetch(&self) -> impl Future<Output = Result<StationInfo, StationError>> + Send;
}

#[derive(Clone)]
pub struct StationClient {
    client: Client,
    endpoint: String,
}

impl StationClient {
    pub fn new(client: Client) -> Self {
        Self::with_endpoint(client, STATION_API)
    }

    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl StationSource for StationClient {
    async fn fetch(&self) -> Result<StationInfo, StationError> {
        debug!("fetching station info from {}", self.endpoint);
        let resp = self
            .client
            .get(&self.endpoint)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        parse_station(status, &body)
    }
}

pub fn parse_station(status: StatusCode, body: &str) -> Result<StationInfo, StationError> {
    if !status.is_success() {
        return Err(StationError::Status(status.as_u16()));
    }

    let parsed: WidgetResponse = serde_json::from_str(body)?;
    let station = parsed.station.ok_or(StationError::MissingStreamUrl)?;

    match station.stream_url {
        Some(url) if !url.is_empty() => Ok(StationInfo {
            stream_url: url,
            name: station.name.filter(|n| !n.is_empty()),
        }),
        _ => Err(StationError::MissingStreamUrl),
    }
}
