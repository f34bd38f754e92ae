use anyhow::Result;
use std::time::Duration;
use tracing::info;

use crate::poller::{Poller, RoundReport};
use crate::recorder::{Durable, Recorder};

/// Drives rounds forever: poll, record, sleep.
///
/// The interval is measured from the end of one round to the start of the
/// next, so a full cycle takes the round duration plus the interval.
pub struct Scheduler<W: Durable> {
    poller: Poller,
    recorder: Recorder<W>,
    interval: Duration,
}

impl<W: Durable> Scheduler<W> {
    pub fn new(poller: Poller, recorder: Recorder<W>, interval: Duration) -> Self {
        Self { poller, recorder, interval }
    }

    /// Run one round and persist its row
    pub async fn tick(&mut self) -> Result<RoundReport> {
        let report = self.poller.run_round().await;
        self.recorder.append(report.timestamp, self.poller.snapshots())?;

        info!(
            devices = report.devices,
            failed = report.failed,
            stale = report.stale,
            duration_ms = report.duration.as_millis() as u64,
            "Finished gathering data"
        );
        Ok(report)
    }

    /// Run `rounds` rounds, or forever when `None`
    pub async fn run(&mut self, rounds: Option<u64>) -> Result<()> {
        let mut completed = 0u64;
        loop {
            self.tick().await?;
            completed += 1;
            if rounds.is_some_and(|limit| completed >= limit) {
                return Ok(());
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    pub fn recorder(&self) -> &Recorder<W> {
        &self.recorder
    }
}
