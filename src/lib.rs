pub mod collector;
pub mod config;
pub mod inventory;
pub mod poller;
pub mod recorder;
pub mod scheduler;

/// Common types used across modules
pub mod types {
    use serde::Deserialize;
    use std::net::IpAddr;

    use crate::collector::FetchError;

    /// Number of CSV fields written per device
    pub const FIELDS_PER_DEVICE: usize = MetricKind::ALL.len();

    /// One polling target: a slot in a chassis, or a standalone unit (slot 1)
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DeviceDescriptor {
        pub address: IpAddr,
        pub slot: u32,
        /// Set for management-protocol devices; selects the identifier table
        pub model: Option<DeviceModel>,
    }

    impl DeviceDescriptor {
        pub fn slot(address: IpAddr, slot: u32) -> Self {
            Self { address, slot, model: None }
        }

        pub fn standalone(address: IpAddr, model: DeviceModel) -> Self {
            Self { address, slot: 1, model: Some(model) }
        }

        /// Column name for one of this device's metrics, `{address}|{slot}|{label}`
        pub fn column(&self, kind: MetricKind) -> String {
            format!("{}|{}|{}", self.address, self.slot, kind.label())
        }
    }

    /// Supported management-protocol device models
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum DeviceModel {
        Rx8200,
        Rx1290,
    }

    impl DeviceModel {
        /// Resolve the model tag used in inventory files
        pub fn from_tag(tag: &str) -> Option<Self> {
            match tag {
                "8200" => Some(DeviceModel::Rx8200),
                "1290" => Some(DeviceModel::Rx1290),
                _ => None,
            }
        }
    }

    impl std::fmt::Display for DeviceModel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                DeviceModel::Rx8200 => write!(f, "RX8200"),
                DeviceModel::Rx1290 => write!(f, "RX1290"),
            }
        }
    }

    /// The four signal-quality metrics, in column order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MetricKind {
        Ber,
        CnRatio,
        CnMargin,
        SignalLevel,
    }

    impl MetricKind {
        pub const ALL: [MetricKind; 4] = [
            MetricKind::Ber,
            MetricKind::CnRatio,
            MetricKind::CnMargin,
            MetricKind::SignalLevel,
        ];

        /// Header label for this metric
        pub fn label(&self) -> &'static str {
            match self {
                MetricKind::Ber => "BER",
                MetricKind::CnRatio => "CN Ratio",
                MetricKind::CnMargin => "CN Margin",
                MetricKind::SignalLevel => "Sig Level",
            }
        }

        fn index(&self) -> usize {
            match self {
                MetricKind::Ber => 0,
                MetricKind::CnRatio => 1,
                MetricKind::CnMargin => 2,
                MetricKind::SignalLevel => 3,
            }
        }
    }

    impl std::fmt::Display for MetricKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let s = match self {
                MetricKind::Ber => "ber",
                MetricKind::CnRatio => "cn_ratio",
                MetricKind::CnMargin => "cn_margin",
                MetricKind::SignalLevel => "signal_level",
            };
            write!(f, "{}", s)
        }
    }

    /// A metric value as reported by the device
    #[derive(Debug, Clone, PartialEq)]
    pub enum MetricValue {
        Text(String),
        Number(f64),
        Integer(i64),
    }

    impl std::fmt::Display for MetricValue {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                MetricValue::Text(s) => write!(f, "{}", s),
                MetricValue::Number(n) => write!(f, "{}", n),
                MetricValue::Integer(i) => write!(f, "{}", i),
            }
        }
    }

    /// What happens to a metric's last value when fetching it fails
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum FailurePolicy {
        /// Keep writing the previous value, marked stale internally
        #[default]
        Retain,
        /// Write the unset marker until the next successful fetch
        Clear,
    }

    /// State of a single metric cell
    #[derive(Debug, Clone, PartialEq, Default)]
    pub enum Cell {
        #[default]
        Unset,
        Fresh(MetricValue),
        Stale(MetricValue),
    }

    impl Cell {
        pub fn value(&self) -> Option<&MetricValue> {
            match self {
                Cell::Unset => None,
                Cell::Fresh(v) | Cell::Stale(v) => Some(v),
            }
        }

        pub fn is_stale(&self) -> bool {
            matches!(self, Cell::Stale(_))
        }

        fn fail(&mut self, policy: FailurePolicy) {
            let prev = std::mem::take(self);
            *self = match (prev, policy) {
                (Cell::Unset, _) | (_, FailurePolicy::Clear) => Cell::Unset,
                (Cell::Fresh(v), FailurePolicy::Retain) | (Cell::Stale(v), FailurePolicy::Retain) => {
                    Cell::Stale(v)
                }
            };
        }
    }

    /// Latest known values of one device's four metrics
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct MetricSnapshot {
        cells: [Cell; 4],
    }

    impl MetricSnapshot {
        pub fn cell(&self, kind: MetricKind) -> &Cell {
            &self.cells[kind.index()]
        }

        pub fn set(&mut self, kind: MetricKind, value: MetricValue) {
            self.cells[kind.index()] = Cell::Fresh(value);
        }

        pub fn fail(&mut self, kind: MetricKind, policy: FailurePolicy) {
            self.cells[kind.index()].fail(policy);
        }

        pub fn fail_all(&mut self, policy: FailurePolicy) {
            for cell in self.cells.iter_mut() {
                cell.fail(policy);
            }
        }

        /// Apply one fetch's readings; failed metrics follow `policy`.
        /// Returns the metrics that failed.
        pub fn apply(&mut self, readings: Readings, policy: FailurePolicy) -> Vec<(MetricKind, FetchError)> {
            let mut failures = Vec::new();
            for (kind, result) in readings.into_entries() {
                match result {
                    Ok(value) => self.set(kind, value),
                    Err(e) => {
                        self.fail(kind, policy);
                        failures.push((kind, e));
                    }
                }
            }
            failures
        }

        pub fn stale_count(&self) -> usize {
            self.cells.iter().filter(|c| c.is_stale()).count()
        }

        /// Render the four cells in column order
        pub fn render(&self, unset_marker: &str) -> [String; 4] {
            MetricKind::ALL.map(|kind| match self.cell(kind).value() {
                Some(v) => v.to_string(),
                None => unset_marker.to_string(),
            })
        }
    }

    /// Per-metric results of one successful device contact
    #[derive(Debug, Default)]
    pub struct Readings {
        entries: Vec<(MetricKind, Result<MetricValue, FetchError>)>,
    }

    impl Readings {
        pub fn new() -> Self {
            Self::default()
        }

        /// Readings where all four metrics were fetched together
        pub fn complete(ber: MetricValue, cn_ratio: MetricValue, cn_margin: MetricValue, signal_level: MetricValue) -> Self {
            let mut readings = Self::new();
            readings.push(MetricKind::Ber, Ok(ber));
            readings.push(MetricKind::CnRatio, Ok(cn_ratio));
            readings.push(MetricKind::CnMargin, Ok(cn_margin));
            readings.push(MetricKind::SignalLevel, Ok(signal_level));
            readings
        }

        pub fn push(&mut self, kind: MetricKind, result: Result<MetricValue, FetchError>) {
            self.entries.push((kind, result));
        }

        pub fn get(&self, kind: MetricKind) -> Option<&Result<MetricValue, FetchError>> {
            self.entries.iter().find(|(k, _)| *k == kind).map(|(_, r)| r)
        }

        pub fn into_entries(self) -> Vec<(MetricKind, Result<MetricValue, FetchError>)> {
            self.entries
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn column_names_follow_address_slot_label() {
            let dev = DeviceDescriptor::slot("10.0.0.1".parse().unwrap(), 3);
            assert_eq!(dev.column(MetricKind::Ber), "10.0.0.1|3|BER");
            assert_eq!(dev.column(MetricKind::SignalLevel), "10.0.0.1|3|Sig Level");
        }

        #[test]
        fn model_tags_are_a_closed_set() {
            assert_eq!(DeviceModel::from_tag("8200"), Some(DeviceModel::Rx8200));
            assert_eq!(DeviceModel::from_tag("1290"), Some(DeviceModel::Rx1290));
            assert_eq!(DeviceModel::from_tag("1222"), None);
            assert_eq!(DeviceModel::from_tag(""), None);
        }

        #[test]
        fn numbers_render_with_default_precision() {
            assert_eq!(MetricValue::Number(12.5).to_string(), "12.5");
            assert_eq!(MetricValue::Number(3.0).to_string(), "3");
            assert_eq!(MetricValue::Integer(-42).to_string(), "-42");
            assert_eq!(MetricValue::Text("1.0E-8".into()).to_string(), "1.0E-8");
        }

        #[test]
        fn failure_on_unset_cell_stays_unset() {
            let mut snap = MetricSnapshot::default();
            snap.fail_all(FailurePolicy::Retain);
            assert_eq!(snap.render("-"), ["-", "-", "-", "-"]);
            assert_eq!(snap.stale_count(), 0);
        }

        #[test]
        fn retain_policy_keeps_previous_value_as_stale() {
            let mut snap = MetricSnapshot::default();
            snap.set(MetricKind::CnRatio, MetricValue::Number(9.5));
            snap.fail(MetricKind::CnRatio, FailurePolicy::Retain);

            assert!(snap.cell(MetricKind::CnRatio).is_stale());
            assert_eq!(snap.render("-")[1], "9.5");
            assert_eq!(snap.stale_count(), 1);
        }

        #[test]
        fn clear_policy_drops_previous_value() {
            let mut snap = MetricSnapshot::default();
            snap.set(MetricKind::CnRatio, MetricValue::Number(9.5));
            snap.fail(MetricKind::CnRatio, FailurePolicy::Clear);

            assert_eq!(snap.cell(MetricKind::CnRatio), &Cell::Unset);
            assert_eq!(snap.render("")[1], "");
        }

        #[test]
        fn apply_updates_successes_and_reports_failures() {
            let mut snap = MetricSnapshot::default();
            snap.set(MetricKind::Ber, MetricValue::Text("old".into()));

            let mut readings = Readings::new();
            readings.push(MetricKind::Ber, Err(FetchError::UnknownFormat("Counter32".into())));
            readings.push(MetricKind::CnRatio, Ok(MetricValue::Integer(11)));
            readings.push(MetricKind::CnMargin, Ok(MetricValue::Integer(4)));
            readings.push(MetricKind::SignalLevel, Ok(MetricValue::Integer(-40)));

            let failures = snap.apply(readings, FailurePolicy::Retain);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, MetricKind::Ber);
            assert_eq!(snap.render("-"), ["old", "11", "4", "-40"]);
        }
    }
}
