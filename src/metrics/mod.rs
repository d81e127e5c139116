//! Metric sources and the task loop that drives each of them.

pub mod cpu;
pub mod memory;
pub mod system;
pub mod users;

pub use cpu::{CpuSample, CpuSource, ProcStat, RawCounterSnapshot};
pub use memory::{MemInfo, MemorySample, MemorySource, ProcMeminfo};
pub use users::{LoginRecord, RecordKind, Session, UserSample, UsersSource, UtmpFile};

use crate::channel::{sample_channel, SampleReceiver, SampleSender};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const SEPARATOR: &str = "----------------------------";

/// A single metric observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Cpu(CpuSample),
    Memory(MemorySample),
    Users(UserSample),
}

/// A sample together with the round it belongs to and its capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedSample {
    pub round: usize,
    pub taken_at: DateTime<Utc>,
    pub sample: Sample,
}

/// Where a source waits for its period relative to collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Collect, publish, then wait. Instantaneous readings.
    After,
    /// Wait, then collect. Readings that measure the elapsed window.
    Before,
}

/// A producer of one kind of sample.
///
/// Implementors own their data source and re-read it on every
/// [`collect`](MetricSource::collect).
pub trait MetricSource: Send + 'static {
    type Output: Into<Sample> + fmt::Debug + Send;

    /// Channel and log name.
    fn name(&self) -> &'static str;

    fn pacing(&self) -> Pacing {
        Pacing::After
    }

    /// Establish any reference state needed before the first round.
    fn prime(&mut self) -> Result<()> {
        Ok(())
    }

    fn collect(&mut self) -> Result<Self::Output>;

    /// Render a sample into display lines.
    fn render(&mut self, sample: &Self::Output) -> Vec<String>;
}

/// Broadcast side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving side of the shutdown signal, one clone per source.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // No receivers left means nothing is running.
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `period`. Returns `false` if shutdown was requested first.
    pub async fn sleep(&mut self, period: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(period) => true,
            _ = wait_for_trigger(&mut self.rx) => false,
        }
    }
}

async fn wait_for_trigger(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Trigger dropped without firing: never resolves.
            std::future::pending::<()>().await;
        }
    }
}

/// Spawn `source` on the runtime and return the aggregator's end of its
/// channel plus the task handle.
pub fn spawn_source<S: MetricSource>(
    source: S,
    sample_count: usize,
    period: Duration,
    shutdown: Shutdown,
) -> (SampleReceiver, JoinHandle<Result<()>>) {
    let (tx, rx) = sample_channel(source.name());
    let task = tokio::spawn(run_source(source, sample_count, period, tx, shutdown));
    (rx, task)
}

/// Produce exactly `sample_count` framed rounds on `tx`, unless shut down or
/// the aggregator hangs up. A source error ends the stream without a
/// terminator for the failing round.
pub async fn run_source<S: MetricSource>(
    mut source: S,
    sample_count: usize,
    period: Duration,
    tx: SampleSender,
    mut shutdown: Shutdown,
) -> Result<()> {
    let name = source.name();
    let result = drive(&mut source, sample_count, period, &tx, &mut shutdown).await;
    match &result {
        Ok(()) => debug!(source = name, "metric source finished"),
        Err(e) => warn!(source = name, error = %e, "metric source failed"),
    }
    result
}

async fn drive<S: MetricSource>(
    source: &mut S,
    sample_count: usize,
    period: Duration,
    tx: &SampleSender,
    shutdown: &mut Shutdown,
) -> Result<()> {
    let name = source.name();
    let pacing = source.pacing();
    source.prime()?;

    for round in 0..sample_count {
        if pacing == Pacing::Before && !shutdown.sleep(period).await {
            return Ok(());
        }

        let output = source.collect()?;
        let lines = source.render(&output);
        let stamped = StampedSample {
            round,
            taken_at: Utc::now(),
            sample: output.into(),
        };
        debug!(
            source = name,
            round = stamped.round,
            taken_at = %stamped.taken_at,
            sample = ?stamped.sample,
            "sample collected"
        );

        if tx.send_round(round, lines).await.is_err() {
            debug!(source = name, round, "aggregator hung up");
            return Ok(());
        }

        let last = round + 1 == sample_count;
        if pacing == Pacing::After && !last && !shutdown.sleep(period).await {
            return Ok(());
        }
    }
    Ok(())
}
