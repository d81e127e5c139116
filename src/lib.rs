//! Concurrent host sampler: CPU, memory and login sessions collected by
//! independent tasks and redrawn in place on the terminal, one round at a
//! time.

pub mod aggregator;
pub mod channel;
pub mod config;
pub mod display;
pub mod error;
pub mod interrupt;
pub mod metrics;

pub use aggregator::{padding_lines, Aggregator, Pipeline, RoundFrame, RunOutcome};
pub use config::{Config, DisplayMode, ParseOutcome, Sections};
pub use display::{Display, TerminalDisplay, VirtualScreen};
pub use error::{MonitorError, Result};
