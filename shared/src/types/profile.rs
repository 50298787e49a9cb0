//! Session report data structures
//!
//! A report is a derived, point-in-time view over the session accumulator.
//! It is never stored by the engine; it is built on demand and is suitable
//! for serialization and display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory estimate, in MiB
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatedMemory {
    /// Geometry plus texture memory
    pub vram: f64,
    pub tex: f64,
    pub geo: f64,

    /// Host process memory
    pub ram: f64,
}

/// Identification strings of the rendering backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererInfo {
    pub version: String,
    pub renderer: String,
    pub vendor: String,
}

impl Default for RendererInfo {
    fn default() -> Self {
        Self {
            version: "Unknown version".to_string(),
            renderer: "Unknown renderer".to_string(),
            vendor: "Unknown vendor".to_string(),
        }
    }
}

/// Per-frame metric values (used for both averages and maxima)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LogValues {
    pub gpu: f64,
    pub cpu: f64,
    pub mem: f64,
    pub fps: f64,
}

/// Averaged draw counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlAverages {
    pub calls: f64,
    pub triangles: f64,
    pub points: f64,
    pub lines: f64,
}

/// Largest draw counters seen in a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlMaxima {
    pub calls: u64,
    pub triangles: u64,
    pub points: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Maxima {
    pub log: LogValues,
    pub gl: GlMaxima,
}

/// Session-level report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Wall-clock time the session started
    pub started_at: DateTime<Utc>,

    /// Seconds elapsed since the session started (monotonic)
    pub session_time: f64,

    pub infos: RendererInfo,

    /// Latest memory snapshot
    pub memory: EstimatedMemory,

    /// Per-frame averages
    pub log: LogValues,

    /// Per-frame draw counter averages
    pub gl: GlAverages,

    pub max: Maxima,

    /// Largest memory estimate seen during the session, in MiB
    pub max_memory: f64,

    pub total_frames: u64,
}

impl Report {
    /// Average frame time implied by the average frame rate, in milliseconds
    pub fn average_frame_time_ms(&self) -> f64 {
        if self.log.fps <= 0.0 {
            0.0
        } else {
            1000.0 / self.log.fps
        }
    }
}
