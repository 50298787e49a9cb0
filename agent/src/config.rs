//! Configuration types for the telemetry engine

use std::path::Path;

use anyhow::Context;
use frameperf_gpu::DEFAULT_MAX_PENDING;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples kept per chart metric
    #[serde(alias = "chartCapacity")]
    pub chart_capacity: usize,

    /// Chart sample rate in Hz
    #[serde(alias = "sampleHz")]
    pub sample_hz: u32,

    /// Report windows flushed per second
    #[serde(alias = "reportsPerSecond")]
    pub reports_per_second: u32,

    /// Time frames on the GPU with timer queries
    #[serde(alias = "trackGpu")]
    pub track_gpu: bool,

    /// Measure the uncapped frame rate during idle time
    pub overclock: bool,

    /// Attribute draw cost to shader programs
    #[serde(alias = "deepAnalyze")]
    pub deep_analyze: bool,

    /// Count matrix updates through host hooks
    #[serde(alias = "matrixUpdate")]
    pub matrix_update: bool,

    /// Display refresh cap used by overclock detection
    #[serde(alias = "fpsLimit")]
    pub fps_limit: u32,

    /// Bound of the pending GPU query queue
    #[serde(alias = "maxPendingQueries")]
    pub max_pending_queries: usize,

    /// Minimum interval between memory estimates
    #[serde(alias = "memoryIntervalMs")]
    pub memory_interval_ms: u64,

    /// Minimum interval between program rescans in deep analyze mode
    #[serde(alias = "rescanIntervalMs")]
    pub rescan_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chart_capacity: 120,
            sample_hz: 60,
            reports_per_second: 10,
            track_gpu: true,
            overclock: false,
            deep_analyze: false,
            matrix_update: false,
            fps_limit: 60,
            max_pending_queries: DEFAULT_MAX_PENDING,
            memory_interval_ms: 1000,
            rescan_interval_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse engine configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Defaults overlaid with `FRAMEPERF_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    fn overlay_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }
        fn flag(value: Option<String>) -> Option<bool> {
            value.map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        }

        if let Some(v) = parse(var("FRAMEPERF_CHART_CAPACITY")) {
            self.chart_capacity = v;
        }
        if let Some(v) = parse(var("FRAMEPERF_SAMPLE_HZ")) {
            self.sample_hz = v;
        }
        if let Some(v) = parse(var("FRAMEPERF_REPORTS_PER_SECOND")) {
            self.reports_per_second = v;
        }
        if let Some(v) = flag(var("FRAMEPERF_TRACK_GPU")) {
            self.track_gpu = v;
        }
        if let Some(v) = flag(var("FRAMEPERF_OVERCLOCK")) {
            self.overclock = v;
        }
        if let Some(v) = flag(var("FRAMEPERF_DEEP_ANALYZE")) {
            self.deep_analyze = v;
        }
        self
    }

    /// Frame budget at the display cap
    pub fn frame_budget_ms(&self) -> f64 {
        if self.fps_limit == 0 {
            return 0.0;
        }
        1000.0 / self.fps_limit as f64
    }

    /// Whether switching from `self` to `other` invalidates session history
    pub fn starts_new_session(&self, other: &EngineConfig) -> bool {
        self.chart_capacity != other.chart_capacity
            || self.sample_hz != other.sample_hz
            || self.reports_per_second != other.reports_per_second
            || self.overclock != other.overclock
            || self.max_pending_queries != other.max_pending_queries
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chart_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "chart capacity must be at least 1".to_string(),
            ));
        }
        if self.sample_hz == 0 {
            return Err(EngineError::InvalidConfig(
                "sample rate must be at least 1 Hz".to_string(),
            ));
        }
        if self.reports_per_second == 0 {
            return Err(EngineError::InvalidConfig(
                "reports per second must be at least 1".to_string(),
            ));
        }
        if self.fps_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "fps limit must be at least 1".to_string(),
            ));
        }
        if self.max_pending_queries == 0 {
            return Err(EngineError::InvalidConfig(
                "pending query bound must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
