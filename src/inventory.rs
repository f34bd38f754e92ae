//! Builds the ordered list of polling targets from an inventory file.
//!
//! Parsing is best-effort: lines that are not valid entries are skipped and
//! logged at debug level. Only failing to read the file is an error.

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

use crate::config::{Config, Transport};
use crate::types::{DeviceDescriptor, DeviceModel};

/// Read the inventory file and build descriptors for the configured transport
pub fn load(path: impl AsRef<Path>, config: &Config) -> Result<Vec<DeviceDescriptor>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory file: {}", path.display()))?;

    let devices = match config.poller.transport {
        Transport::Rest => chassis_slots(&parse_addresses(&content), config.rest.slots_per_chassis),
        Transport::Snmp => parse_units(&content),
    };

    tracing::info!(devices = devices.len(), path = %path.display(), "Loaded inventory");
    Ok(devices)
}

/// One bare IP address per line; anything else is ignored
pub fn parse_addresses(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| match line.parse::<IpAddr>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                if !line.is_empty() {
                    debug!(line, "Skipping inventory line that is not an IP address");
                }
                None
            }
        })
        .collect()
}

/// Expand each chassis address into `slots` descriptors, slots numbered from 1
pub fn chassis_slots(hosts: &[IpAddr], slots: u32) -> Vec<DeviceDescriptor> {
    hosts
        .iter()
        .flat_map(|host| (1..=slots).map(move |slot| DeviceDescriptor::slot(*host, slot)))
        .collect()
}

/// `<address> <model-tag>` per line; bad addresses and unknown tags are ignored
pub fn parse_units(content: &str) -> Vec<DeviceDescriptor> {
    let mut units = Vec::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(addr), Some(tag)) = (parts.next(), parts.next()) else {
            if !line.trim().is_empty() {
                debug!(line, "Skipping incomplete inventory line");
            }
            continue;
        };

        let Ok(address) = addr.parse::<IpAddr>() else {
            debug!(line, "Skipping inventory line with invalid address");
            continue;
        };

        match DeviceModel::from_tag(tag) {
            Some(model) => units.push(DeviceDescriptor::standalone(address, model)),
            None => debug!(%address, tag, "Skipping unit with unrecognised model"),
        }
    }

    units
}
