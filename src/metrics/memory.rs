//! Physical and virtual memory usage from /proc/meminfo.

use super::{MetricSource, Sample};
use crate::error::{MonitorError, Result};
use std::fs;
use std::path::PathBuf;

const SOURCE: &str = "memory";

/// Bytes per reported gigabyte. Decimal on purpose: values are shown as
/// `kB * 1024 / 1e9`, not GiB.
pub const BYTES_PER_GB: f64 = 1e9;

/// Changes smaller than this many GB are drawn as a single marker.
const DELTA_EPSILON: f64 = 1e-9;
pub const NEGLIGIBLE_DELTA_GB: f64 = 0.01;

/// Header printed above the memory block.
pub const MEMORY_HEADER: &str = "### Memory ### (Phys.Used/Tot -- Virtual Used/Tot) ";

/// The /proc/meminfo fields the memory source needs, in kB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub s_reclaimable: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// Anything that can hand out fresh meminfo fields on demand
pub trait MeminfoSource: Send + 'static {
    fn read_meminfo(&mut self) -> Result<MemInfo>;
}

/// Reads /proc/meminfo (or a file with the same format), reopened on every read
#[derive(Debug, Clone)]
pub struct ProcMeminfo {
    path: PathBuf,
}

impl ProcMeminfo {
    pub fn new() -> Self {
        Self::at("/proc/meminfo")
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMeminfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MeminfoSource for ProcMeminfo {
    fn read_meminfo(&mut self) -> Result<MemInfo> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            MonitorError::unavailable(SOURCE, format!("{}: {}", self.path.display(), e))
        })?;
        parse_meminfo(&content)
    }
}

/// Parse /proc/meminfo content. Every field of [`MemInfo`] must be present.
pub fn parse_meminfo(content: &str) -> Result<MemInfo> {
    let mut mem_total = None;
    let mut mem_free = None;
    let mut buffers = None;
    let mut cached = None;
    let mut s_reclaimable = None;
    let mut swap_total = None;
    let mut swap_free = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let slot = match key {
            "MemTotal:" => &mut mem_total,
            "MemFree:" => &mut mem_free,
            "Buffers:" => &mut buffers,
            "Cached:" => &mut cached,
            "SReclaimable:" => &mut s_reclaimable,
            "SwapTotal:" => &mut swap_total,
            "SwapFree:" => &mut swap_free,
            _ => continue,
        };
        let kb = value.parse::<u64>().map_err(|e| {
            MonitorError::unavailable(SOURCE, format!("bad value for {} {}: {}", key, value, e))
        })?;
        *slot = Some(kb);
    }

    let require = |value: Option<u64>, field: &str| {
        value.ok_or_else(|| MonitorError::unavailable(SOURCE, format!("missing field {}", field)))
    };

    Ok(MemInfo {
        mem_total: require(mem_total, "MemTotal")?,
        mem_free: require(mem_free, "MemFree")?,
        buffers: require(buffers, "Buffers")?,
        cached: require(cached, "Cached")?,
        s_reclaimable: require(s_reclaimable, "SReclaimable")?,
        swap_total: require(swap_total, "SwapTotal")?,
        swap_free: require(swap_free, "SwapFree")?,
    })
}

fn kb_to_gb(kb: u64) -> f64 {
    kb.saturating_mul(1024) as f64 / BYTES_PER_GB
}

/// One memory observation, all values in decimal GB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub phys_used_gb: f64,
    pub phys_total_gb: f64,
    pub virt_used_gb: f64,
    pub virt_total_gb: f64,
}

impl MemorySample {
    /// Derive usage from raw fields.
    ///
    /// Used physical memory excludes buffers, page cache and reclaimable slab;
    /// virtual memory is physical plus swap. The fields are not read
    /// atomically, so every difference saturates at zero.
    pub fn from_meminfo(info: &MemInfo) -> Self {
        let phys_used = info
            .mem_total
            .saturating_sub(info.mem_free)
            .saturating_sub(
                info.buffers
                    .saturating_add(info.cached)
                    .saturating_add(info.s_reclaimable),
            );
        let swap_used = info.swap_total.saturating_sub(info.swap_free);
        let virt_total = info.mem_total.saturating_add(info.swap_total);
        let virt_used = phys_used.saturating_add(swap_used).min(virt_total);

        Self {
            phys_used_gb: kb_to_gb(phys_used),
            phys_total_gb: kb_to_gb(info.mem_total),
            virt_used_gb: kb_to_gb(virt_used),
            virt_total_gb: kb_to_gb(virt_total),
        }
    }
}

impl From<MemorySample> for Sample {
    fn from(sample: MemorySample) -> Self {
        Sample::Memory(sample)
    }
}

/// Direction and size of the change in used physical memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    /// `0 <= delta < 0.01`, or the first tick
    SlightRise,
    /// `-0.01 <= delta < 0`
    SlightDrop,
    /// Growth drawn with this many bars
    Rise(usize),
    /// Shrinkage drawn with this many bars
    Drop(usize),
}

impl Trend {
    pub fn classify(previous_gb: Option<f64>, current_gb: f64) -> Self {
        let Some(previous_gb) = previous_gb else {
            return Trend::SlightRise;
        };
        let delta = current_gb - previous_gb;
        // Absorb binary rounding so an exact tenth draws its bar.
        let bars = (delta.abs() * 10.0 + DELTA_EPSILON).floor() as usize;
        if delta >= 0.0 {
            if delta < NEGLIGIBLE_DELTA_GB {
                Trend::SlightRise
            } else {
                Trend::Rise(bars)
            }
        } else if delta >= -NEGLIGIBLE_DELTA_GB {
            Trend::SlightDrop
        } else {
            Trend::Drop(bars)
        }
    }

    pub fn graph(self) -> String {
        match self {
            Trend::SlightRise => "o".to_string(),
            Trend::SlightDrop => "@".to_string(),
            Trend::Rise(bars) => format!("{}*", "#".repeat(bars)),
            Trend::Drop(bars) => format!("{}@", ":".repeat(bars)),
        }
    }
}

/// Memory source; remembers the last used value for the delta graph
pub struct MemorySource<M: MeminfoSource = ProcMeminfo> {
    meminfo: M,
    graphics: bool,
    previous_gb: Option<f64>,
}

impl<M: MeminfoSource> MemorySource<M> {
    pub fn new(meminfo: M, graphics: bool) -> Self {
        Self {
            meminfo,
            graphics,
            previous_gb: None,
        }
    }
}

impl<M: MeminfoSource> MetricSource for MemorySource<M> {
    type Output = MemorySample;

    fn name(&self) -> &'static str {
        SOURCE
    }

    fn collect(&mut self) -> Result<MemorySample> {
        let info = self.meminfo.read_meminfo()?;
        Ok(MemorySample::from_meminfo(&info))
    }

    fn render(&mut self, sample: &MemorySample) -> Vec<String> {
        let mut line = render_memory(sample);
        if self.graphics {
            line.push_str(&memory_graph(self.previous_gb, sample.phys_used_gb));
        }
        self.previous_gb = Some(sample.phys_used_gb);
        vec![line]
    }
}

pub fn render_memory(sample: &MemorySample) -> String {
    format!(
        "{:.2} GB / {:.2} GB  -- {:.2} GB / {:.2} GB",
        sample.phys_used_gb, sample.phys_total_gb, sample.virt_used_gb, sample.virt_total_gb
    )
}

/// Graph suffix appended to the memory line: `   |<bars> <|delta|> (<current>)`.
pub fn memory_graph(previous_gb: Option<f64>, current_gb: f64) -> String {
    let delta = previous_gb.map_or(0.0, |prev| current_gb - prev);
    format!(
        "   |{} {:.2} ({:.2})",
        Trend::classify(previous_gb, current_gb).graph(),
        delta.abs(),
        current_gb
    )
}
