//! GPU timing statistics

/// Running counters kept by the query scheduler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuTimingStats {
    /// Query objects constructed (pool misses)
    pub created: u64,

    /// Queries that started recording
    pub issued: u64,

    /// Queries whose result was read back
    pub resolved: u64,

    /// Queries dropped from a full pending queue
    pub evicted: u64,

    /// Queries discarded because of a disjoint event
    pub disjoint: u64,

    pub context_losses: u64,

    total_gpu_ms: f64,
    max_gpu_ms: f64,
}

impl GpuTimingStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved duration
    pub fn record_resolved(&mut self, gpu_ms: f64) {
        self.resolved += 1;
        self.total_gpu_ms += gpu_ms;
        if gpu_ms > self.max_gpu_ms {
            self.max_gpu_ms = gpu_ms;
        }
    }

    /// Sum of all resolved durations
    pub fn total_gpu_ms(&self) -> f64 {
        self.total_gpu_ms
    }

    pub fn max_gpu_ms(&self) -> f64 {
        self.max_gpu_ms
    }

    /// Mean resolved duration, 0 before the first result
    pub fn average_gpu_ms(&self) -> f64 {
        if self.resolved == 0 {
            0.0
        } else {
            self.total_gpu_ms / self.resolved as f64
        }
    }
}
