use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::config::OutputConfig;
use crate::types::{DeviceDescriptor, MetricKind, MetricSnapshot, FIELDS_PER_DEVICE};

/// Output that can be forced to stable storage after a flush
pub trait Durable: Write {
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Durable for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

impl Durable for Vec<u8> {}

/// Column names: `Timestamp`, then four columns per device in descriptor order
pub fn header<'a>(devices: impl IntoIterator<Item = &'a DeviceDescriptor>) -> Vec<String> {
    let mut hdr = vec!["Timestamp".to_string()];
    for device in devices {
        hdr.extend(MetricKind::ALL.iter().map(|kind| device.column(*kind)));
    }
    hdr
}

/// Appends one CSV row per round, flushing after each
pub struct Recorder<W: Durable = File> {
    writer: csv::Writer<W>,
    fields: usize,
    timestamp_format: String,
    unset_marker: String,
    sync: bool,
}

impl Recorder<File> {
    /// Create (or truncate) the output file and write the header
    pub fn create(path: impl AsRef<Path>, header: &[String], config: &OutputConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Self::new(file, header, config)
    }
}

impl<W: Durable> Recorder<W> {
    pub fn new(output: W, header: &[String], config: &OutputConfig) -> Result<Self> {
        let mut recorder = Self {
            writer: csv::Writer::from_writer(output),
            fields: header.len(),
            timestamp_format: config.timestamp_format.clone(),
            unset_marker: config.unset_marker.clone(),
            sync: config.sync,
        };
        recorder.write(header)?;
        Ok(recorder)
    }

    /// Serialize a round into a row matching the header
    pub fn row(&self, timestamp: DateTime<Local>, snapshots: &[MetricSnapshot]) -> Vec<String> {
        let mut record = Vec::with_capacity(1 + snapshots.len() * FIELDS_PER_DEVICE);
        record.push(timestamp.format(&self.timestamp_format).to_string());
        for snapshot in snapshots {
            record.extend(snapshot.render(&self.unset_marker));
        }
        record
    }

    pub fn append(&mut self, timestamp: DateTime<Local>, snapshots: &[MetricSnapshot]) -> Result<()> {
        let record = self.row(timestamp, snapshots);
        if record.len() != self.fields {
            anyhow::bail!(
                "row has {} fields but header has {}",
                record.len(),
                self.fields
            );
        }
        self.write(&record)
    }

    fn write(&mut self, record: &[String]) -> Result<()> {
        self.writer.write_record(record).context("Failed to write CSV row")?;
        self.writer.flush().context("Failed to flush output")?;
        if self.sync {
            self.writer.get_ref().sync().context("Failed to sync output")?;
        }
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::inventory::chassis_slots;
    use crate::types::{FailurePolicy, MetricValue};

    fn two_chassis() -> Vec<DeviceDescriptor> {
        chassis_slots(&["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()], 6)
    }

    fn lines(recorder: &Recorder<Vec<u8>>) -> Vec<String> {
        String::from_utf8(recorder.get_ref().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn field_count(line: &str) -> usize {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(line.as_bytes())
            .records()
            .next()
            .unwrap()
            .unwrap()
            .len()
    }

    #[test]
    fn two_chassis_of_six_slots_yield_49_columns() {
        let hdr = header(&two_chassis());
        assert_eq!(hdr.len(), 49);
        assert_eq!(hdr[0], "Timestamp");
        assert_eq!(hdr[1], "10.0.0.1|1|BER");
        assert_eq!(hdr[2], "10.0.0.1|1|CN Ratio");
        assert_eq!(hdr[3], "10.0.0.1|1|CN Margin");
        assert_eq!(hdr[4], "10.0.0.1|1|Sig Level");
        assert_eq!(hdr[48], "10.0.0.2|6|Sig Level");
    }

    #[test]
    fn header_is_deterministic() {
        let devices = two_chassis();
        assert_eq!(header(&devices), header(&devices));
    }

    #[test]
    fn every_row_matches_header_width() {
        let devices = two_chassis();
        let hdr = header(&devices);
        let mut recorder = Recorder::new(Vec::new(), &hdr, &OutputConfig::default()).unwrap();

        let mut snapshots = vec![MetricSnapshot::default(); devices.len()];
        let ts = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        recorder.append(ts, &snapshots).unwrap();

        snapshots[4].set(MetricKind::Ber, MetricValue::Text("1.0E-9, approx".into()));
        snapshots[4].set(MetricKind::CnRatio, MetricValue::Number(10.25));
        snapshots[7].fail_all(FailurePolicy::Retain);
        recorder.append(ts, &snapshots).unwrap();

        let out = lines(&recorder);
        assert_eq!(out.len(), 3);
        for line in &out {
            assert_eq!(field_count(line), 49);
        }
        assert!(out[2].contains("\"1.0E-9, approx\",10.25,-,-"));
    }

    #[test]
    fn unset_values_use_marker() {
        let devices = chassis_slots(&["10.0.0.1".parse().unwrap()], 1);
        let config = OutputConfig {
            timestamp_format: "%Y-%m-%d %H:%M:%S".into(),
            unset_marker: String::new(),
            sync: false,
        };
        let mut recorder = Recorder::new(Vec::new(), &header(&devices), &config).unwrap();
        let ts = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        recorder.append(ts, &[MetricSnapshot::default()]).unwrap();

        assert_eq!(lines(&recorder)[1], "2024-03-01 12:30:05,,,,");
    }

    #[test]
    fn default_timestamp_ends_with_numeric_offset() {
        let devices = chassis_slots(&["10.0.0.1".parse().unwrap()], 1);
        let recorder = Recorder::new(Vec::new(), &header(&devices), &OutputConfig::default()).unwrap();
        let ts = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();

        let stamp = &recorder.row(ts, &[MetricSnapshot::default()])[0];
        let re = regex::Regex::new(r"^Fri, 01 Mar 2024 12:30:05 [+-]\d{4}$").unwrap();
        assert!(re.is_match(stamp), "{}", stamp);
    }

    #[test]
    fn mismatched_row_is_rejected() {
        let devices = two_chassis();
        let mut recorder = Recorder::new(Vec::new(), &header(&devices), &OutputConfig::default()).unwrap();

        let err = recorder.append(Local::now(), &[MetricSnapshot::default()]).unwrap_err();
        assert!(err.to_string().contains("fields"));
    }

    #[test]
    fn file_output_is_flushed_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let devices = chassis_slots(&["10.0.0.1".parse().unwrap()], 2);
        let config = OutputConfig { sync: true, ..OutputConfig::default() };

        let mut recorder = Recorder::create(&path, &header(&devices), &config).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);

        recorder.append(Local::now(), &vec![MetricSnapshot::default(); 2]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(field_count(content.lines().nth(1).unwrap()), 9);
    }
}
