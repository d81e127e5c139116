//! Round-by-round aggregation of the metric channels onto a [`Display`].

use crate::channel::SampleReceiver;
use crate::config::{Config, DisplayMode};
use crate::display::Display;
use crate::error::{MonitorError, Result};
use crate::interrupt::Prompt;
use crate::metrics::memory::MEMORY_HEADER;
use crate::metrics::system::{self, SystemInfo};
use crate::metrics::{
    shutdown_channel, spawn_source, MetricSource, Shutdown, ShutdownTrigger, SEPARATOR,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Blank lines written under the memory block in round `round` of
/// `sample_count`, reserving room for the memory lines still to come.
pub fn padding_lines(sample_count: usize, round: usize) -> usize {
    sample_count.saturating_sub(round + 1)
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every round was rendered.
    Completed { rounds: usize },
    /// The user confirmed a quit; `rounds` were rendered before it.
    Aborted { rounds: usize },
}

/// The payload of one round, one block per active section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundFrame {
    pub memory: Option<Vec<String>>,
    pub users: Option<Vec<String>>,
    pub cpu: Option<Vec<String>>,
}

struct SourceHandle {
    rx: SampleReceiver,
    task: Option<JoinHandle<Result<()>>>,
}

impl SourceHandle {
    fn spawn<S: MetricSource>(source: S, (n, period, shutdown): (usize, Duration, Shutdown)) -> Self {
        let (rx, task) = spawn_source(source, n, period, shutdown);
        Self {
            rx,
            task: Some(task),
        }
    }

    async fn drain(&mut self, round: usize) -> Result<Vec<String>> {
        match self.rx.recv_round(round).await {
            Err(truncated @ MonitorError::TruncatedStream { .. }) => {
                // Prefer the producer's own error over the bare hang-up.
                Err(self.failure().await.unwrap_or(truncated))
            }
            other => other,
        }
    }

    async fn failure(&mut self) -> Option<MonitorError> {
        let task = self.task.take()?;
        match task.await {
            Ok(Err(e)) => Some(e),
            Ok(Ok(())) => None,
            Err(e) => {
                warn!(channel = self.rx.name(), error = %e, "metric source task died");
                None
            }
        }
    }

    async fn join(mut self) {
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(channel = self.rx.name(), error = %e, "metric source failed late"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(channel = self.rx.name(), error = %e, "metric source task died"),
            }
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The running metric sources, drained in the fixed order memory, users, cpu.
pub struct Pipeline {
    memory: Option<SourceHandle>,
    users: Option<SourceHandle>,
    cpu: Option<SourceHandle>,
    shutdown: ShutdownTrigger,
}

impl Pipeline {
    /// Start one task per section enabled in `config`. Sources for disabled
    /// sections are dropped unstarted.
    pub fn spawn<M, U, C>(config: &Config, memory: M, users: U, cpu: C) -> Self
    where
        M: MetricSource,
        U: MetricSource,
        C: MetricSource,
    {
        let (trigger, shutdown) = shutdown_channel();
        let sections = config.sections;
        let start = |enabled: bool| enabled.then(|| (config.sample_count, config.period, shutdown.clone()));

        Self {
            memory: start(sections.memory()).map(|args| SourceHandle::spawn(memory, args)),
            users: start(sections.users()).map(|args| SourceHandle::spawn(users, args)),
            cpu: start(sections.cpu()).map(|args| SourceHandle::spawn(cpu, args)),
            shutdown: trigger,
        }
    }

    /// Wait for every active channel's payload of `round`, in order.
    pub async fn drain_round(&mut self, round: usize) -> Result<RoundFrame> {
        Ok(RoundFrame {
            memory: drain(&mut self.memory, round).await?,
            users: drain(&mut self.users, round).await?,
            cpu: drain(&mut self.cpu, round).await?,
        })
    }

    fn handles(self) -> impl Iterator<Item = SourceHandle> {
        [self.memory, self.users, self.cpu].into_iter().flatten()
    }

    /// Wait for sources that have delivered all their rounds.
    pub async fn finish(self) {
        for handle in self.handles() {
            handle.join().await;
        }
    }

    /// Stop every source and wait for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for handle in self.handles() {
            let SourceHandle { rx, task } = handle;
            // Closing the receiver unblocks a source waiting on a full channel.
            let name = rx.name();
            drop(rx);
            if let Some(task) = task {
                if let Err(e) = task.await {
                    warn!(channel = name, error = %e, "metric source task died");
                }
            }
        }
    }

    /// Stop every source without waiting.
    pub fn abort(mut self) {
        self.shutdown.trigger();
        for handle in [&mut self.memory, &mut self.users, &mut self.cpu]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

async fn drain(handle: &mut Option<SourceHandle>, round: usize) -> Result<Option<Vec<String>>> {
    match handle {
        Some(handle) => handle.drain(round).await.map(Some),
        None => Ok(None),
    }
}

/// Owns the display and lays out each drained round on it.
pub struct Aggregator<D: Display, P: Prompt> {
    config: Config,
    display: D,
    prompt: P,
    interrupts: Option<mpsc::UnboundedReceiver<()>>,
    /// Rows the users and CPU blocks took in the last refreshed round.
    tail_height: usize,
}

impl<D: Display, P: Prompt> Aggregator<D, P> {
    pub fn new(config: Config, display: D, prompt: P) -> Self {
        Self {
            config,
            display,
            prompt,
            interrupts: None,
            tail_height: 0,
        }
    }

    /// Poll `interrupts` between rounds and confirm through the prompt.
    pub fn with_interrupts(mut self, interrupts: mpsc::UnboundedReceiver<()>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_display(self) -> D {
        self.display
    }

    /// Render `sample_count` rounds from `pipeline`.
    ///
    /// A fatal error stops every source and leaves the display as it was
    /// after the last complete round.
    pub async fn run(&mut self, mut pipeline: Pipeline) -> Result<RunOutcome> {
        info!(
            samples = self.config.sample_count,
            period_secs = self.config.period_secs(),
            mode = ?self.config.mode,
            sections = ?self.config.sections,
            "starting sampling run"
        );

        match self.run_rounds(&mut pipeline).await {
            Ok(outcome @ RunOutcome::Completed { .. }) => {
                pipeline.finish().await;
                Ok(outcome)
            }
            Ok(outcome @ RunOutcome::Aborted { rounds }) => {
                info!(rounds, "run aborted by user");
                pipeline.shutdown().await;
                Ok(outcome)
            }
            Err(e) => {
                pipeline.abort();
                Err(e)
            }
        }
    }

    async fn run_rounds(&mut self, pipeline: &mut Pipeline) -> Result<RunOutcome> {
        self.write_preamble()?;

        let n = self.config.sample_count;
        for round in 0..n {
            if self.quit_requested()? {
                return Ok(RunOutcome::Aborted { rounds: round });
            }

            let frame = pipeline.drain_round(round).await?;
            match self.config.mode {
                DisplayMode::Refreshing => self.render_refreshing(round, &frame)?,
                DisplayMode::Sequential => self.render_sequential(round, &frame)?,
            }
            self.display.flush()?;
            debug!(round, "round rendered");
        }
        Ok(RunOutcome::Completed { rounds: n })
    }

    /// Append the uname section after a run.
    pub fn write_system_info(&mut self, info: &SystemInfo) -> Result<()> {
        self.display.write_lines(&info.render())?;
        self.display.flush()?;
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool> {
        let Some(interrupts) = self.interrupts.as_mut() else {
            return Ok(false);
        };
        let mut requested = false;
        while interrupts.try_recv().is_ok() {
            requested = true;
        }
        if !requested {
            return Ok(false);
        }
        let quit = self.prompt.confirm_quit()?;
        debug!(quit, "interrupt answered");
        Ok(quit)
    }

    fn write_preamble(&mut self) -> Result<()> {
        let Config {
            sample_count,
            mode,
            sections,
            ..
        } = self.config;
        self.display.write_line(SEPARATOR)?;
        self.display.write_line(&format!(
            "Nbr of samples: {} -- every {} secs",
            sample_count,
            self.config.period_secs()
        ))?;

        if mode == DisplayMode::Refreshing {
            if sections.memory() {
                self.write_self_usage()?;
                self.display.write_line(SEPARATOR)?;
                self.display.write_line(MEMORY_HEADER)?;
            }
            self.display.save_anchor()?;
        }
        self.display.flush()?;
        Ok(())
    }

    fn write_self_usage(&mut self) -> Result<()> {
        match system::self_usage_line() {
            Ok(line) => self.display.write_line(&line)?,
            Err(e) => warn!(error = %e, "cannot read own memory usage"),
        }
        Ok(())
    }

    /// Memory lines accumulate under the anchor; users and CPU stay put
    /// below the padding.
    fn render_refreshing(&mut self, round: usize, frame: &RoundFrame) -> Result<()> {
        let d = &mut self.display;
        d.restore_anchor()?;
        match &frame.memory {
            Some(memory) => {
                d.write_lines(memory)?;
                d.save_anchor()?;
                d.write_blanks(padding_lines(self.config.sample_count, round))?;
            }
            None => d.save_anchor()?,
        }
        let mut tail_height = 0;
        if let Some(users) = &frame.users {
            d.write_lines(users)?;
            tail_height += users.len();
        }
        if let Some(cpu) = &frame.cpu {
            d.write_lines(cpu)?;
            tail_height += cpu.len();
        }
        // Erase what a taller previous round left below.
        d.write_blanks(self.tail_height.saturating_sub(tail_height))?;
        self.tail_height = tail_height;
        Ok(())
    }

    fn render_sequential(&mut self, round: usize, frame: &RoundFrame) -> Result<()> {
        self.display
            .write_line(&format!(">>> iteration {}", round + 1))?;
        self.write_self_usage()?;

        let d = &mut self.display;
        if let Some(memory) = &frame.memory {
            d.write_line(SEPARATOR)?;
            d.write_line(MEMORY_HEADER)?;
            d.write_blanks(round)?;
            d.write_lines(memory)?;
            d.write_blanks(padding_lines(self.config.sample_count, round))?;
        }
        if let Some(users) = &frame.users {
            d.write_lines(users)?;
        }
        if let Some(cpu) = &frame.cpu {
            d.write_lines(cpu)?;
        }
        d.write_line(SEPARATOR)?;
        Ok(())
    }
}
