//! CPU utilization sampled from the aggregate line of /proc/stat.

use super::{system, MetricSource, Pacing, Sample, SEPARATOR};
use crate::error::{MonitorError, Result};
use std::fs;
use std::path::PathBuf;

const SOURCE: &str = "cpu";

/// Cumulative jiffy counters read at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounterSnapshot {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
}

impl RawCounterSnapshot {
    pub fn new(user: u64, nice: u64, system: u64, idle: u64) -> Self {
        Self {
            user,
            nice,
            system,
            idle,
        }
    }

    /// Utilization percentage over the window from `prev` to `self`.
    ///
    /// A window with no elapsed jiffies reports 0%. Counters that went
    /// backwards count as zero.
    pub fn usage_since(&self, prev: &RawCounterSnapshot) -> f64 {
        let busy = self.user.saturating_sub(prev.user)
            + self.nice.saturating_sub(prev.nice)
            + self.system.saturating_sub(prev.system);
        let total = busy + self.idle.saturating_sub(prev.idle);
        if total == 0 {
            return 0.0;
        }
        (100.0 * busy as f64 / total as f64).clamp(0.0, 100.0)
    }
}

/// Anything that can hand out a fresh counter snapshot on demand
pub trait CounterSource: Send + 'static {
    fn read_counters(&mut self) -> Result<RawCounterSnapshot>;
}

/// Reads /proc/stat (or a file with the same format), reopened on every read
#[derive(Debug, Clone)]
pub struct ProcStat {
    path: PathBuf,
}

impl ProcStat {
    pub fn new() -> Self {
        Self::at("/proc/stat")
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcStat {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for ProcStat {
    fn read_counters(&mut self) -> Result<RawCounterSnapshot> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            MonitorError::unavailable(SOURCE, format!("{}: {}", self.path.display(), e))
        })?;
        parse_proc_stat(&content)
    }
}

/// Parse the aggregate `cpu` line of /proc/stat content.
pub fn parse_proc_stat(content: &str) -> Result<RawCounterSnapshot> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| MonitorError::unavailable(SOURCE, "no aggregate cpu line"))?;

    let fields = line
        .split_whitespace()
        .skip(1) // "cpu"
        .take(4)
        .map(|s| s.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| MonitorError::unavailable(SOURCE, format!("bad counter: {}", e)))?;

    match fields[..] {
        [user, nice, system, idle] => Ok(RawCounterSnapshot::new(user, nice, system, idle)),
        _ => Err(MonitorError::unavailable(
            SOURCE,
            format!("expected 4 counters, found {}", fields.len()),
        )),
    }
}

/// One CPU observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    /// Busy share of the last window, 0..=100
    pub usage_percent: f64,
    /// Online cores when the sample was taken
    pub cores: usize,
}

impl From<CpuSample> for Sample {
    fn from(sample: CpuSample) -> Self {
        Sample::Cpu(sample)
    }
}

/// CPU source with back-to-back measurement windows.
///
/// The end snapshot of one window is the start snapshot of the next, so
/// each sample costs a single period.
pub struct CpuSource<C: CounterSource = ProcStat> {
    counters: C,
    prev: Option<RawCounterSnapshot>,
    graphics: bool,
}

impl<C: CounterSource> CpuSource<C> {
    pub fn new(counters: C, graphics: bool) -> Self {
        Self {
            counters,
            prev: None,
            graphics,
        }
    }
}

impl<C: CounterSource> MetricSource for CpuSource<C> {
    type Output = CpuSample;

    fn name(&self) -> &'static str {
        SOURCE
    }

    fn pacing(&self) -> Pacing {
        Pacing::Before
    }

    fn prime(&mut self) -> Result<()> {
        self.prev = Some(self.counters.read_counters()?);
        Ok(())
    }

    fn collect(&mut self) -> Result<CpuSample> {
        let curr = self.counters.read_counters()?;
        let usage_percent = match self.prev.replace(curr) {
            Some(prev) => curr.usage_since(&prev),
            // Without a reference window there is nothing to report yet.
            None => 0.0,
        };
        Ok(CpuSample {
            usage_percent,
            cores: system::online_cores(),
        })
    }

    fn render(&mut self, sample: &CpuSample) -> Vec<String> {
        render_cpu(sample, self.graphics)
    }
}

/// Render the CPU section.
pub fn render_cpu(sample: &CpuSample, graphics: bool) -> Vec<String> {
    let mut lines = vec![
        SEPARATOR.to_string(),
        format!("Number of cores: {}", sample.cores),
        format!("CPU usage: {:.2}%", sample.usage_percent),
    ];
    if graphics {
        lines.push(cpu_graph(sample.usage_percent));
    }
    lines
}

/// One `|` per whole percentage point, then the value.
pub fn cpu_graph(usage_percent: f64) -> String {
    let bars = usage_percent.clamp(0.0, 100.0).floor() as usize;
    format!("\t{} {:.2}%", "|".repeat(bars), usage_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;

    struct Scripted(VecDeque<RawCounterSnapshot>);

    impl CounterSource for Scripted {
        fn read_counters(&mut self) -> Result<RawCounterSnapshot> {
            self.0
                .pop_front()
                .ok_or_else(|| MonitorError::unavailable(SOURCE, "script exhausted"))
        }
    }

    fn snap(user: u64, nice: u64, system: u64, idle: u64) -> RawCounterSnapshot {
        RawCounterSnapshot::new(user, nice, system, idle)
    }

    #[test]
    fn test_usage_between_snapshots() {
        let s0 = snap(10, 0, 5, 85);
        let s1 = snap(20, 0, 10, 105);
        let usage = s1.usage_since(&s0);
        assert!((usage - 15.0 / 35.0 * 100.0).abs() < 1e-9);
        assert_eq!(format!("{:.2}", usage), "42.86");
    }

    #[test]
    fn test_zero_window_reports_zero() {
        let s = snap(10, 0, 5, 85);
        assert_eq!(s.usage_since(&s), 0.0);
    }

    #[test]
    fn test_usage_is_bounded() {
        assert_eq!(snap(100, 0, 0, 0).usage_since(&snap(0, 0, 0, 0)), 100.0);
        assert_eq!(snap(0, 0, 0, 50).usage_since(&snap(0, 0, 0, 0)), 0.0);
        // Counter regression saturates instead of wrapping.
        let usage = snap(5, 0, 0, 10).usage_since(&snap(10, 0, 0, 0));
        assert!((0.0..=100.0).contains(&usage));
    }

    #[test]
    fn test_parse_proc_stat() {
        let content = "cpu  10 0 5 85 3 0 1 0 0 0\ncpu0 5 0 2 40 1 0 0 0 0 0\nctxt 1234\n";
        assert_eq!(parse_proc_stat(content).unwrap(), snap(10, 0, 5, 85));
    }

    #[test]
    fn test_parse_proc_stat_rejects_garbage() {
        assert!(parse_proc_stat("cpu0 1 2 3 4\n").is_err());
        assert!(parse_proc_stat("cpu  1 2 3\n").is_err());
        assert!(parse_proc_stat("cpu  1 x 3 4\n").is_err());
    }

    #[test]
    fn test_proc_stat_rereads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cpu  1 2 3 4").unwrap();
        let mut stat = ProcStat::at(file.path());
        assert_eq!(stat.read_counters().unwrap(), snap(1, 2, 3, 4));

        std::fs::write(file.path(), "cpu  5 6 7 8\n").unwrap();
        assert_eq!(stat.read_counters().unwrap(), snap(5, 6, 7, 8));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let mut stat = ProcStat::at("/nonexistent/stat");
        assert!(matches!(
            stat.read_counters(),
            Err(MonitorError::SourceUnavailable {
                source_name: "cpu",
                ..
            })
        ));
    }

    #[test]
    fn test_windows_are_back_to_back() {
        let script = VecDeque::from(vec![
            snap(10, 0, 5, 85),
            snap(20, 0, 10, 105),
            snap(20, 0, 10, 125),
        ]);
        let mut source = CpuSource::new(Scripted(script), false);
        source.prime().unwrap();
        let first = source.collect().unwrap();
        let second = source.collect().unwrap();
        assert!((first.usage_percent - 42.857142857142854).abs() < 1e-9);
        // Second window starts where the first ended: only idle advanced.
        assert_eq!(second.usage_percent, 0.0);
    }

    #[test]
    fn test_render_with_graph() {
        let sample = CpuSample {
            usage_percent: 3.5,
            cores: 4,
        };
        let lines = render_cpu(&sample, true);
        assert_eq!(lines[0], SEPARATOR);
        assert_eq!(lines[1], "Number of cores: 4");
        assert_eq!(lines[2], "CPU usage: 3.50%");
        assert_eq!(lines[3], "\t||| 3.50%");
        assert_eq!(render_cpu(&sample, false).len(), 3);
    }

    #[test]
    fn test_graph_has_one_bar_per_point() {
        assert_eq!(cpu_graph(42.86).matches('|').count(), 42);
        assert_eq!(cpu_graph(0.0).matches('|').count(), 0);
        assert_eq!(cpu_graph(100.0).matches('|').count(), 100);
    }
}
