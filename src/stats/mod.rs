//! Delta-based resource usage sampling from procfs.
//!
//! Every sampler needs a baseline, so the first call for each metric reports
//! no data. Failed or inconsistent reads keep the last good reading.

use std::fs;
use std::io;
use std::time::Instant;

mod cpu;
mod disk;
mod memory;
mod network;

pub use cpu::{CpuSampler, CpuTicks};
pub use disk::{DiskBusy, DiskSampler};
pub use memory::{MemoryInfo, MemorySampler};
pub use network::{NetworkSampler, NetworkTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Classification {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    pub amber: f32,
    pub red: f32,
}

impl Thresholds {
    pub const fn new(amber: f32, red: f32) -> Self {
        Self { amber, red }
    }

    pub fn classify(&self, value: f32) -> Classification {
        if value >= self.red {
            Classification::Critical
        } else if value >= self.amber {
            Classification::Warning
        } else {
            Classification::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ThresholdConfig {
    pub cpu: Thresholds,
    pub memory: Thresholds,
    pub network: Thresholds,
    pub disk: Thresholds,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu: Thresholds::new(20.0, 80.0),
            memory: Thresholds::new(60.0, 80.0),
            network: Thresholds::new(1000.0, 10000.0),
            disk: Thresholds::new(20.0, 80.0),
        }
    }
}

impl ThresholdConfig {
    pub fn for_metric(&self, metric: Metric) -> Thresholds {
        match metric {
            Metric::Cpu => self.cpu,
            Metric::Memory => self.memory,
            Metric::Network => self.network,
            Metric::Disk => self.disk,
        }
    }
}

/// Metrics in status line order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Memory,
    Network,
    Disk,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Cpu, Metric::Memory, Metric::Network, Metric::Disk];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Network => "network",
            Metric::Disk => "disk",
        }
    }

    fn source(&self) -> ProcFile {
        match self {
            Metric::Cpu => ProcFile::Stat,
            Metric::Memory => ProcFile::MemInfo,
            Metric::Network => ProcFile::NetDev,
            Metric::Disk => ProcFile::DiskStats,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Percent(f32),
    /// Receive and transmit rates in KB/s.
    Rates { rx: f32, tx: f32 },
}

impl MetricValue {
    /// The figure compared against thresholds.
    pub fn level(&self) -> f32 {
        match self {
            MetricValue::Percent(value) => *value,
            MetricValue::Rates { rx, tx } => rx.max(*tx),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub metric: Metric,
    pub value: MetricValue,
    pub class: Classification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub cpu: Option<Reading>,
    pub memory: Option<Reading>,
    pub network: Option<Reading>,
    pub disk: Option<Reading>,
}

impl Readings {
    pub fn get(&self, metric: Metric) -> Option<Reading> {
        match metric {
            Metric::Cpu => self.cpu,
            Metric::Memory => self.memory,
            Metric::Network => self.network,
            Metric::Disk => self.disk,
        }
    }

    fn slot(&mut self, metric: Metric) -> &mut Option<Reading> {
        match metric {
            Metric::Cpu => &mut self.cpu,
            Metric::Memory => &mut self.memory,
            Metric::Network => &mut self.network,
            Metric::Disk => &mut self.disk,
        }
    }

    /// Available readings in status line order.
    pub fn iter(&self) -> impl Iterator<Item = Reading> + '_ {
        Metric::ALL.into_iter().filter_map(|metric| self.get(metric))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcFile {
    Stat,
    MemInfo,
    NetDev,
    DiskStats,
}

impl ProcFile {
    pub fn path(&self) -> &'static str {
        match self {
            ProcFile::Stat => "/proc/stat",
            ProcFile::MemInfo => "/proc/meminfo",
            ProcFile::NetDev => "/proc/net/dev",
            ProcFile::DiskStats => "/proc/diskstats",
        }
    }
}

pub trait ProcSource: Send {
    fn read(&mut self, file: ProcFile) -> io::Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFs;

impl ProcSource for ProcFs {
    fn read(&mut self, file: ProcFile) -> io::Result<String> {
        fs::read_to_string(file.path())
    }
}

pub struct StatSampler {
    source: Box<dyn ProcSource>,
    thresholds: ThresholdConfig,
    cpu: CpuSampler,
    memory: MemorySampler,
    network: NetworkSampler,
    disk: DiskSampler,
    last: Readings,
}

impl StatSampler {
    pub fn new(source: Box<dyn ProcSource>, thresholds: ThresholdConfig) -> Self {
        Self {
            source,
            thresholds,
            cpu: CpuSampler::default(),
            memory: MemorySampler::default(),
            network: NetworkSampler::default(),
            disk: DiskSampler::default(),
            last: Readings::default(),
        }
    }

    pub fn procfs(thresholds: ThresholdConfig) -> Self {
        Self::new(Box::new(ProcFs), thresholds)
    }

    /// Takes one fresh sample. `None` means no data this time: baseline
    /// still being established, unreadable source, or an invalid delta.
    pub fn sample(&mut self, metric: Metric, now: Instant) -> Option<Reading> {
        let contents = match self.source.read(metric.source()) {
            Ok(contents) => contents,
            Err(error) => {
                tracing::debug!(
                    metric = metric.label(),
                    path = metric.source().path(),
                    %error,
                    "sample source unreadable"
                );
                return None;
            }
        };
        let value = match metric {
            Metric::Cpu => self.cpu.sample(&contents).map(MetricValue::Percent),
            Metric::Memory => self.memory.sample(&contents).map(MetricValue::Percent),
            Metric::Network => self
                .network
                .sample(&contents, now)
                .map(|(rx, tx)| MetricValue::Rates { rx, tx }),
            Metric::Disk => self.disk.sample(&contents, now).map(MetricValue::Percent),
        }?;
        let class = self.thresholds.for_metric(metric).classify(value.level());
        Some(Reading {
            metric,
            value,
            class,
        })
    }

    /// Samples every metric, keeping the previous reading for any that
    /// produced no data.
    pub fn refresh(&mut self, now: Instant) -> Readings {
        for metric in Metric::ALL {
            if let Some(reading) = self.sample(metric, now) {
                *self.last.slot(metric) = Some(reading);
            }
        }
        self.last
    }

    pub fn last(&self) -> Readings {
        self.last
    }
}

#[cfg(test)]
#[path = "../tests/stats_tests.rs"]
mod tests;
