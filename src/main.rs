//! sysmon - sample CPU, memory and user sessions at a fixed period and
//! keep the terminal picture updated in place.

use anyhow::{Context, Result};
use sysmon::interrupt::{forward_interrupts, ignore_suspend, TerminalPrompt};
use sysmon::metrics::system::SystemInfo;
use sysmon::metrics::{CpuSource, MemorySource, ProcMeminfo, ProcStat, UsersSource, UtmpFile};
use sysmon::{Aggregator, Config, ParseOutcome, Pipeline, RunOutcome, Sections, TerminalDisplay};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::try_parse_from(std::env::args_os()) {
        Ok(config) => config,
        Err(ParseOutcome::Info(e)) => e.exit(),
        Err(ParseOutcome::Invalid(e)) => return Err(e.into()),
    };

    init_tracing();

    ignore_suspend().context("Failed to install the Ctrl-Z handler")?;
    let interrupts = forward_interrupts();

    let pipeline = Pipeline::spawn(
        &config,
        MemorySource::new(ProcMeminfo::new(), config.graphics),
        UsersSource::new(UtmpFile::new()),
        CpuSource::new(ProcStat::new(), config.graphics),
    );

    let mut aggregator = Aggregator::new(config.clone(), TerminalDisplay::stdout(), TerminalPrompt)
        .with_interrupts(interrupts);
    let outcome = aggregator.run(pipeline).await.context("Sampling run failed")?;

    match outcome {
        RunOutcome::Completed { rounds } => {
            info!(rounds, "sampling run complete");
            if config.sections != Sections::UsersOnly {
                match SystemInfo::query() {
                    Ok(info) => aggregator
                        .write_system_info(&info)
                        .context("Failed to write system information")?,
                    Err(e) => warn!(error = %e, "uname failed"),
                }
            }
        }
        RunOutcome::Aborted { rounds } => info!(rounds, "stopped on user request"),
    }
    Ok(())
}

/// Diagnostics go to stderr at `warn` unless RUST_LOG says otherwise, so
/// they stay out of the redrawn picture.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
