use async_trait::async_trait;
use snmp2::{AsyncSession, Oid, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::SnmpConfig;
use crate::types::{DeviceDescriptor, DeviceModel, MetricKind, MetricValue, Readings};
use super::{FetchError, MetricSource};

/// Object identifiers of the four metrics on one device model
#[derive(Debug, Clone, Copy)]
pub struct OidTable {
    pub ber: &'static str,
    pub cn_ratio: &'static str,
    pub cn_margin: &'static str,
    pub signal_level: &'static str,
}

impl OidTable {
    pub fn oid(&self, kind: MetricKind) -> &'static str {
        match kind {
            MetricKind::Ber => self.ber,
            MetricKind::CnRatio => self.cn_ratio,
            MetricKind::CnMargin => self.cn_margin,
            MetricKind::SignalLevel => self.signal_level,
        }
    }
}

const RX8200_OIDS: OidTable = OidTable {
    ber: "1.3.6.1.4.1.1773.1.3.208.2.2.4.0",
    cn_ratio: "1.3.6.1.4.1.1773.1.3.208.2.2.5.0",
    cn_margin: "1.3.6.1.4.1.1773.1.3.208.2.2.6.0",
    signal_level: "1.3.6.1.4.1.1773.1.3.208.2.2.3.0",
};

const RX1290_OIDS: OidTable = OidTable {
    ber: "1.3.6.1.4.1.1773.1.3.200.4.1.4.0",
    cn_ratio: "1.3.6.1.4.1.1773.1.3.200.4.3.3.1.6.3.0",
    cn_margin: "1.3.6.1.4.1.1773.1.3.200.4.3.3.1.2.0",
    signal_level: "1.3.6.1.4.1.1773.1.3.200.4.3.3.1.6.4.0",
};

impl DeviceModel {
    pub fn oids(&self) -> &'static OidTable {
        match self {
            DeviceModel::Rx8200 => &RX8200_OIDS,
            DeviceModel::Rx1290 => &RX1290_OIDS,
        }
    }
}

/// Reads a single value from an agent
#[async_trait]
pub trait OidReader: Send + Sync {
    async fn read(&self, target: SocketAddr, oid: &str) -> Result<MetricValue, FetchError>;
}

/// SNMPv2c GET over a fresh session per request
pub struct SessionReader {
    community: Vec<u8>,
    timeout: Duration,
}

impl SessionReader {
    pub fn new(config: &SnmpConfig) -> Self {
        Self {
            community: config.community.clone().into_bytes(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl OidReader for SessionReader {
    async fn read(&self, target: SocketAddr, oid: &str) -> Result<MetricValue, FetchError> {
        let oid = parse_oid(oid)?;

        let mut session = AsyncSession::new_v2c(target, &self.community, 0)
            .await
            .map_err(|e| FetchError::Snmp(e.to_string()))?;

        let resp = timeout(self.timeout, session.get(&oid))
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| FetchError::Snmp(e.to_string()))?;

        let mut varbinds = resp.varbinds;
        let (_, value) = varbinds
            .next()
            .ok_or_else(|| FetchError::Snmp("empty response".to_string()))?;

        decode_value(&value)
    }
}

/// Parse a dotted OID string
pub fn parse_oid(s: &str) -> Result<Oid<'static>, FetchError> {
    let parts: Result<Vec<u64>, _> = s
        .trim()
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u64>())
        .collect();

    let parts = parts.map_err(|_| FetchError::InvalidOid(s.to_string()))?;
    Oid::from(&parts).map_err(|_| FetchError::InvalidOid(s.to_string()))
}

/// Only text and integer values are meaningful for these metrics
pub fn decode_value(value: &Value<'_>) -> Result<MetricValue, FetchError> {
    match value {
        Value::OctetString(bytes) => Ok(MetricValue::Text(String::from_utf8_lossy(bytes).into_owned())),
        Value::Integer(n) => Ok(MetricValue::Integer(*n)),
        other => Err(FetchError::UnknownFormat(format!("{:?}", other))),
    }
}

/// Queries each metric identifier of a standalone unit independently
pub struct SnmpSource<R: OidReader = SessionReader> {
    port: u16,
    reader: R,
}

impl SnmpSource<SessionReader> {
    pub fn new(config: &SnmpConfig) -> Self {
        Self::with_reader(config.port, SessionReader::new(config))
    }
}

impl<R: OidReader> SnmpSource<R> {
    pub fn with_reader(port: u16, reader: R) -> Self {
        Self { port, reader }
    }
}

#[async_trait]
impl<R: OidReader> MetricSource for SnmpSource<R> {
    fn name(&self) -> &str { "snmp" }

    async fn fetch(&self, device: &DeviceDescriptor) -> Result<Readings, FetchError> {
        let table = device.model.ok_or(FetchError::MissingIdentifiers)?.oids();
        let target = SocketAddr::new(device.address, self.port);

        // Metrics are independent; a stalled identifier must not hold back the rest
        let (ber, cn_ratio, cn_margin, signal_level) = tokio::join!(
            self.reader.read(target, table.oid(MetricKind::Ber)),
            self.reader.read(target, table.oid(MetricKind::CnRatio)),
            self.reader.read(target, table.oid(MetricKind::CnMargin)),
            self.reader.read(target, table.oid(MetricKind::SignalLevel)),
        );

        let mut readings = Readings::new();
        readings.push(MetricKind::Ber, ber);
        readings.push(MetricKind::CnRatio, cn_ratio);
        readings.push(MetricKind::CnMargin, cn_margin);
        readings.push(MetricKind::SignalLevel, signal_level);
        Ok(readings)
    }
}
