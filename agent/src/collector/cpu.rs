//! CPU frame timer
//!
//! Measures the interval between frame begin and frame end on a monotonic
//! clock. Timestamps are passed in by the engine, which owns the clock.

use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct CpuTimer {
    started_ms: Option<f64>,
    last_ms: f64,
}

impl CpuTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the frame start
    pub fn mark_start(&mut self, now_ms: f64) {
        self.started_ms = Some(now_ms);
    }

    /// Close the interval opened by [`CpuTimer::mark_start`] and return its
    /// length in milliseconds, or `None` when no interval is open
    pub fn mark_end(&mut self, now_ms: f64) -> Option<f64> {
        let started = self.started_ms.take()?;
        let elapsed = (now_ms - started).max(0.0);
        trace!("cpu frame time {:.3} ms", elapsed);
        self.last_ms = elapsed;
        Some(elapsed)
    }

    pub fn is_running(&self) -> bool {
        self.started_ms.is_some()
    }

    /// Timestamp of the open interval's start
    pub fn started_ms(&self) -> Option<f64> {
        self.started_ms
    }

    /// Duration of the last closed interval
    pub fn last_ms(&self) -> f64 {
        self.last_ms
    }

    /// Drop an open interval without measuring it
    pub fn cancel(&mut self) {
        self.started_ms = None;
    }
}
