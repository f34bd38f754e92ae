//! Round orchestration.
//!
//! A round spawns one task per device, waits until every task has reported
//! (successfully, with an error, or by panicking) and only then folds the
//! results into the per-device snapshots. Snapshots are therefore written by
//! a single control flow, in descriptor order, after the join barrier.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::collector::{FetchError, MetricSource};
use crate::types::{DeviceDescriptor, FailurePolicy, MetricSnapshot, Readings};

/// Summary of one completed round
#[derive(Debug, Clone)]
pub struct RoundReport {
    /// Wall-clock start, written to the Timestamp column
    pub timestamp: DateTime<Local>,
    pub started: Instant,
    pub duration: Duration,
    pub devices: usize,
    /// Devices whose fetch failed entirely
    pub failed: usize,
    /// Metric cells currently holding a retained value
    pub stale: usize,
}

/// Owns the device list and the latest snapshot of every device
pub struct Poller {
    devices: Vec<Arc<DeviceDescriptor>>,
    snapshots: Vec<MetricSnapshot>,
    source: Arc<dyn MetricSource>,
    fetch_timeout: Duration,
    policy: FailurePolicy,
}

impl Poller {
    pub fn new(
        devices: Vec<DeviceDescriptor>,
        source: Arc<dyn MetricSource>,
        fetch_timeout: Duration,
        policy: FailurePolicy,
    ) -> Self {
        let snapshots = vec![MetricSnapshot::default(); devices.len()];
        Self {
            devices: devices.into_iter().map(Arc::new).collect(),
            snapshots,
            source,
            fetch_timeout,
            policy,
        }
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter().map(|d| d.as_ref())
    }

    pub fn snapshots(&self) -> &[MetricSnapshot] {
        &self.snapshots
    }

    /// Poll every device once and wait for all of them to settle
    pub async fn run_round(&mut self) -> RoundReport {
        let timestamp = Local::now();
        let started = Instant::now();
        let expected = self.devices.len();

        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(expected);
        for (idx, device) in self.devices.iter().enumerate() {
            let device = Arc::clone(device);
            let source = Arc::clone(&self.source);
            let limit = self.fetch_timeout;

            let handle = tasks.spawn(async move {
                match timeout(limit, source.fetch(&device)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout),
                }
            });
            task_index.insert(handle.id(), idx);
        }

        let mut outcomes: Vec<Option<Result<Readings, FetchError>>> =
            (0..expected).map(|_| None).collect();
        let mut completed = 0usize;

        while let Some(joined) = tasks.join_next_with_id().await {
            completed += 1;
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(FetchError::Task(e.to_string()))),
            };
            if let Some(&idx) = task_index.get(&id) {
                outcomes[idx] = Some(result);
            }
        }
        debug_assert_eq!(completed, expected);

        let mut failed = 0usize;
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            let device = &self.devices[idx];
            let snapshot = &mut self.snapshots[idx];

            match outcome {
                Some(Ok(readings)) => {
                    for (metric, e) in snapshot.apply(readings, self.policy) {
                        warn!(address = %device.address, slot = device.slot, %metric, error = %e,
                            "Metric fetch failed");
                    }
                }
                Some(Err(e)) => {
                    failed += 1;
                    snapshot.fail_all(self.policy);
                    warn!(address = %device.address, slot = device.slot, error = %e, "Device fetch failed");
                }
                None => {
                    failed += 1;
                    snapshot.fail_all(self.policy);
                    warn!(address = %device.address, slot = device.slot, "Device fetch reported no result");
                }
            }
        }

        let stale = self.snapshots.iter().map(MetricSnapshot::stale_count).sum();
        let duration = started.elapsed();
        debug!(devices = expected, failed, "Round aggregated");

        RoundReport {
            timestamp,
            started,
            duration,
            devices: expected,
            failed,
            stale,
        }
    }
}
