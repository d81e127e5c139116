//! Error taxonomy for the sampling pipeline.

use std::io;
use thiserror::Error;

/// Errors raised by metric sources, sample channels and the aggregator.
///
/// A zero CPU delta is not represented here: it is recovered inside the CPU
/// source by reporting 0% usage.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A data source could not be opened or parsed. Fatal for the whole run,
    /// since no later round can complete without this source.
    #[error("{source_name} source unavailable: {reason}")]
    SourceUnavailable {
        source_name: &'static str,
        reason: String,
    },

    /// A channel closed before delivering the end-of-round marker.
    #[error("{channel} channel closed before the end of round {round}")]
    TruncatedStream { channel: &'static str, round: usize },

    /// A channel delivered the end-of-round marker of another round.
    #[error("{channel} channel ended round {got} while round {expected} was being drained")]
    OutOfOrder {
        channel: &'static str,
        expected: usize,
        got: usize,
    },

    /// Malformed command line.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Writing to the display or reading the prompt answer failed.
    #[error("terminal I/O failed: {0}")]
    Terminal(#[from] io::Error),
}

impl MonitorError {
    pub(crate) fn unavailable(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
