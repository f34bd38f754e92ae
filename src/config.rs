use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::types::FailurePolicy;

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub snmp: SnmpConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

/// Which transport the metric source speaks
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Rest,
    Snmp,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default)]
    pub transport: Transport,
    /// Wait between the end of one round and the start of the next
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Upper bound on a single device fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Rest,
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            on_failure: FailurePolicy::Retain,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RestConfig {
    /// Assumed number of descrambler slots in each chassis
    #[serde(default = "default_slots")]
    pub slots_per_chassis: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub port: Option<u16>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            slots_per_chassis: default_slots(),
            request_timeout_secs: default_request_timeout(),
            port: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnmpConfig {
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            community: default_community(),
            port: default_snmp_port(),
            timeout_secs: default_snmp_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// chrono strftime format of the Timestamp column. Times are local, so
    /// the zone is written as a numeric offset (`%z`, e.g. `+0100`).
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Written for metrics that have no value
    #[serde(default = "default_unset_marker")]
    pub unset_marker: String,
    /// fsync the output file after every row
    #[serde(default)]
    pub sync: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            timestamp_format: default_timestamp_format(),
            unset_marker: default_unset_marker(),
            sync: false,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration text, expanding `${ENV_VAR}` references first
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rest.slots_per_chassis == 0 {
            anyhow::bail!("rest.slots_per_chassis must be at least 1");
        }
        if self.poller.fetch_timeout_secs == 0 {
            anyhow::bail!("poller.fetch_timeout_secs must be at least 1");
        }
        if self.snmp.timeout_secs >= self.poller.fetch_timeout_secs {
            anyhow::bail!(
                "snmp.timeout_secs ({}) must be less than poller.fetch_timeout_secs ({})",
                self.snmp.timeout_secs,
                self.poller.fetch_timeout_secs
            );
        }
        Ok(())
    }
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .to_string()
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_interval() -> u64 { 30 }
fn default_fetch_timeout() -> u64 { 10 }
fn default_slots() -> u32 { 6 }
fn default_request_timeout() -> u64 { 5 }
fn default_community() -> String { "public".to_string() }
fn default_snmp_port() -> u16 { 161 }
fn default_snmp_timeout() -> u64 { 2 }
fn default_timestamp_format() -> String { "%a, %d %b %Y %H:%M:%S %z".to_string() }
fn default_unset_marker() -> String { "-".to_string() }
