//! Per-frame event types
//!
//! These types represent the values produced once per completed frame, the
//! renderer counters read from the host, and the payload handed to passive
//! observers of the `log` notification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Logical frame index, incremented at every frame begin
pub type FrameIndex = u64;

/// A charted metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Fps,
    Cpu,
    Gpu,
    Mem,
}

impl Metric {
    /// Every charted metric, in storage order
    pub const ALL: [Metric; 4] = [Metric::Fps, Metric::Cpu, Metric::Gpu, Metric::Mem];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fps => "fps",
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Mem => "mem",
        }
    }

    /// Position of the metric's backing array in a chart
    pub fn index(&self) -> usize {
        match self {
            Self::Fps => 0,
            Self::Cpu => 1,
            Self::Gpu => 2,
            Self::Mem => 3,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fps" => Ok(Metric::Fps),
            "cpu" => Ok(Metric::Cpu),
            "gpu" => Ok(Metric::Gpu),
            "mem" => Ok(Metric::Mem),
            _ => Err(UnknownMetric(s.to_string())),
        }
    }
}

/// A scalar metric value tagged with the frame that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: Metric,
    pub value: f64,
    pub frame: FrameIndex,
}

/// Values measured for one completed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// Frame the CPU/fps values belong to
    pub frame: FrameIndex,

    /// CPU time spent between frame begin and frame end, in milliseconds
    pub cpu: f64,

    /// Most recently resolved GPU time, in milliseconds
    pub gpu: f64,

    /// Latest memory estimate, in MiB
    pub mem: f64,

    /// Instantaneous frame rate derived from the frame interval
    pub fps: f64,
}

impl FrameSample {
    /// Split the frame into per-metric samples
    pub fn samples(&self) -> [Sample; 4] {
        Metric::ALL.map(|metric| Sample {
            metric,
            value: self.value(metric),
            frame: self.frame,
        })
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Fps => self.fps,
            Metric::Cpu => self.cpu,
            Metric::Gpu => self.gpu,
            Metric::Mem => self.mem,
        }
    }
}

/// Draw counters the renderer accumulates over one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderCounters {
    pub calls: u64,
    pub triangles: u64,
    pub points: u64,
    pub lines: u64,
}

impl RenderCounters {
    /// Primitives submitted this frame, all kinds combined
    pub fn total_primitives(&self) -> u64 {
        self.triangles + self.lines + self.points
    }
}

/// Live GPU resource counts held by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub geometries: u64,
    pub textures: u64,
    pub programs: u64,
}

/// Renderer counters attached to every log notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlInfo {
    pub calls: u64,
    pub triangles: u64,
    pub points: u64,
    pub lines: u64,
    pub geometries: u64,
    pub textures: u64,
    pub programs: u64,
}

impl GlInfo {
    pub fn new(counters: RenderCounters, resources: ResourceCounts) -> Self {
        Self {
            calls: counters.calls,
            triangles: counters.triangles,
            points: counters.points,
            lines: counters.lines,
            geometries: resources.geometries,
            textures: resources.textures,
            programs: resources.programs,
        }
    }
}

/// Window averages flushed a fixed number of times per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameLog {
    pub cpu: f64,
    pub gpu: f64,
    pub mem: f64,
    pub fps: f64,

    /// Length of the window, in milliseconds
    pub duration_ms: f64,

    /// Frames completed inside the window
    pub frame_count: u64,

    /// Largest memory estimate seen so far, in MiB
    pub max_memory: f64,
}

/// Payload of the per-frame `log` notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub sample: FrameSample,
    pub gl: GlInfo,
}
