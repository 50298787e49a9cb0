//! Chart history ring buffer
//!
//! One fixed-length circular array per metric and a single write cursor
//! shared by all of them, so that index `i` refers to the same frame in
//! every metric.

use frameperf_shared::{FrameSample, Metric};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default number of samples kept per metric
pub const DEFAULT_CHART_CAPACITY: usize = 120;

/// Default chart sample rate
pub const DEFAULT_SAMPLE_HZ: u32 = 60;

/// Trailing per-metric history
#[derive(Debug, Clone)]
pub struct ChartBuffer {
    capacity: usize,
    hz: u32,
    data: [Vec<f64>; 4],
    circular_id: usize,
    frames: u64,
}

/// Serializable copy of a chart, oldest sample first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSnapshot {
    pub capacity: usize,
    pub hz: u32,
    pub frames: u64,
    pub data: BTreeMap<String, Vec<f64>>,
}

impl ChartBuffer {
    /// Create a zero-filled chart. A capacity or rate of 0 is raised to 1.
    pub fn new(capacity: usize, hz: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            hz: hz.max(1),
            data: std::array::from_fn(|_| vec![0.0; capacity]),
            circular_id: 0,
            frames: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }

    /// Next write position
    pub fn circular_id(&self) -> usize {
        self.circular_id
    }

    /// Frames written since the last reset
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Seconds of history the chart covers when full
    pub fn span_secs(&self) -> f64 {
        self.capacity as f64 / self.hz as f64
    }

    /// Write `value` at the cursor for `metric`; does not move the cursor
    pub fn push(&mut self, metric: Metric, value: f64) {
        self.data[metric.index()][self.circular_id] = value;
    }

    /// Move the cursor past the frame just written
    pub fn advance(&mut self) {
        self.circular_id = (self.circular_id + 1) % self.capacity;
        self.frames += 1;
    }

    /// Write every metric of a frame, then advance
    pub fn push_frame(&mut self, frame: &FrameSample) {
        for sample in frame.samples() {
            self.push(sample.metric, sample.value);
        }
        self.advance();
    }

    /// Most recently completed sample; 0 when nothing has been written
    pub fn latest(&self, metric: Metric) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        let idx = (self.circular_id + self.capacity - 1) % self.capacity;
        self.data[metric.index()][idx]
    }

    /// The whole buffer for `metric`, oldest to newest. Always `capacity`
    /// long; slots never written read 0.
    pub fn history(&self, metric: Metric) -> Vec<f64> {
        let series = &self.data[metric.index()];
        (0..self.capacity)
            .map(|i| series[(self.circular_id + i) % self.capacity])
            .collect()
    }

    /// Backing array in storage order
    pub fn raw(&self, metric: Metric) -> &[f64] {
        &self.data[metric.index()]
    }

    /// Apply a new capacity or rate. Any change discards the history and
    /// resets the cursor; returns whether that happened.
    pub fn reconfigure(&mut self, capacity: usize, hz: u32) -> bool {
        let capacity = capacity.max(1);
        let hz = hz.max(1);
        if capacity == self.capacity && hz == self.hz {
            return false;
        }
        *self = Self::new(capacity, hz);
        true
    }

    /// Zero every metric and reset the cursor, keeping the configuration
    pub fn clear(&mut self) {
        *self = Self::new(self.capacity, self.hz);
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        ChartSnapshot {
            capacity: self.capacity,
            hz: self.hz,
            frames: self.frames,
            data: Metric::ALL
                .iter()
                .map(|m| (m.name().to_string(), self.history(*m)))
                .collect(),
        }
    }
}

impl Default for ChartBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHART_CAPACITY, DEFAULT_SAMPLE_HZ)
    }
}
