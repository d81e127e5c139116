//! Framed, one-directional transport between a metric source and the aggregator.
//!
//! A round travels as any number of [`Record::Line`] payload records closed by
//! exactly one [`Record::EndOfRound`]. The terminator is its own variant, so no
//! payload text can ever be mistaken for it.

use crate::error::{MonitorError, Result};
use tokio::sync::mpsc;

/// Records buffered per channel before a producer waits for the aggregator.
pub const CHANNEL_CAPACITY: usize = 64;

/// One framed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// One rendered line of the current round's payload.
    Line(String),
    /// The current round is complete.
    EndOfRound { round: usize },
}

/// Producer half, owned by a metric source task.
#[derive(Debug)]
pub struct SampleSender {
    tx: mpsc::Sender<Record>,
}

/// Consumer half, owned by the aggregator.
#[derive(Debug)]
pub struct SampleReceiver {
    name: &'static str,
    rx: mpsc::Receiver<Record>,
}

/// Create a channel for the source called `name`.
pub fn sample_channel(name: &'static str) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (SampleSender { tx }, SampleReceiver { name, rx })
}

/// Returned when the aggregator has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

impl SampleSender {
    /// Send one round's payload followed by its terminator.
    pub async fn send_round(
        &self,
        round: usize,
        lines: Vec<String>,
    ) -> std::result::Result<(), Disconnected> {
        for line in lines {
            self.send(Record::Line(line)).await?;
        }
        self.send(Record::EndOfRound { round }).await
    }

    /// Send a single record.
    pub async fn send(&self, record: Record) -> std::result::Result<(), Disconnected> {
        self.tx.send(record).await.map_err(|_| Disconnected)
    }
}

impl SampleReceiver {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the complete payload of `round`.
    ///
    /// Blocks with no timeout until the terminator arrives. Returns
    /// `TruncatedStream` if the producer hangs up first and `OutOfOrder` if
    /// the terminator names another round.
    pub async fn recv_round(&mut self, round: usize) -> Result<Vec<String>> {
        let mut payload = Vec::new();
        loop {
            match self.rx.recv().await {
                Some(Record::Line(line)) => payload.push(line),
                Some(Record::EndOfRound { round: got }) if got == round => return Ok(payload),
                Some(Record::EndOfRound { round: got }) => {
                    return Err(MonitorError::OutOfOrder {
                        channel: self.name,
                        expected: round,
                        got,
                    })
                }
                None => {
                    return Err(MonitorError::TruncatedStream {
                        channel: self.name,
                        round,
                    })
                }
            }
        }
    }
}
