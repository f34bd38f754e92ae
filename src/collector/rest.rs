use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::RestConfig;
use crate::types::{DeviceDescriptor, MetricValue, Readings};
use super::{FetchError, MetricSource};

/// Reads all four metrics of a chassis slot from its `sources` endpoint
pub struct RestSource {
    port: Option<u16>,
    client: reqwest::Client,
}

impl RestSource {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { port: config.port, client })
    }

    pub fn endpoint(&self, device: &DeviceDescriptor) -> String {
        let host = match device.address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        let authority = match self.port {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };
        format!(
            "http://{}/api/profiles/~1/sandbox/~0/inputTransportStreams/~{}/sources",
            authority, device.slot
        )
    }
}

#[async_trait]
impl MetricSource for RestSource {
    fn name(&self) -> &str { "rest" }

    async fn fetch(&self, device: &DeviceDescriptor) -> Result<Readings, FetchError> {
        let resp = self.client.get(self.endpoint(device)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = resp.bytes().await.map_err(|e| FetchError::Body(e.to_string()))?;
        let sources: SourcesResponse = serde_json::from_slice(&body)?;
        let data = sources.into_data()?;

        Ok(Readings::complete(
            MetricValue::Text(data.ber.value),
            MetricValue::Number(data.carrier_to_noise_ratio.value),
            MetricValue::Number(data.carrier_to_noise_margin.value),
            MetricValue::Number(data.signal_level.value),
        ))
    }
}

/// Body of `GET .../inputTransportStreams/~{slot}/sources`
#[derive(Debug, Deserialize)]
struct SourcesResponse {
    collection: Collection,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    data: SourceData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceData {
    ber: Field<String>,
    carrier_to_noise_ratio: Field<f64>,
    carrier_to_noise_margin: Field<f64>,
    signal_level: Field<f64>,
}

#[derive(Debug, Deserialize)]
struct Field<T> {
    value: T,
}

impl SourcesResponse {
    /// Data of the first collection item
    fn into_data(self) -> Result<SourceData, FetchError> {
        self.collection
            .items
            .into_iter()
            .next()
            .map(|item| item.data)
            .ok_or(FetchError::EmptyCollection)
    }
}
