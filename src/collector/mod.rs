pub mod rest;
pub mod snmp;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, Transport};
use crate::types::{DeviceDescriptor, Readings};

/// Reasons a single device fetch can fail. None of these abort a round.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response contained no collection items")]
    EmptyCollection,
    #[error("snmp error: {0}")]
    Snmp(String),
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    #[error("invalid identifier {0}")]
    InvalidOid(String),
    #[error("device has no metric identifiers")]
    MissingIdentifiers,
    #[error("timed out")]
    Timeout,
    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Trait for per-transport metric sources.
///
/// A source contacts one device and returns its current readings. A device
/// that cannot be contacted at all yields `Err`; a device that answered for
/// only some metrics yields `Ok` with per-metric errors inside the readings.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Transport name (e.g., "rest", "snmp")
    fn name(&self) -> &str;

    /// Fetch current metric values for `device`
    async fn fetch(&self, device: &DeviceDescriptor) -> Result<Readings, FetchError>;
}

/// Create the metric source for the configured transport
pub fn create_source(config: &Config) -> Result<Arc<dyn MetricSource>> {
    let source: Arc<dyn MetricSource> = match config.poller.transport {
        Transport::Rest => Arc::new(rest::RestSource::new(&config.rest)?),
        Transport::Snmp => Arc::new(snmp::SnmpSource::new(&config.snmp)),
    };

    tracing::info!(transport = source.name(), "Initialized metric source");
    Ok(source)
}
