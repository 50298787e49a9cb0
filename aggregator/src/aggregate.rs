//! Session statistics
//!
//! [`SessionAccumulator`] keeps running averages and maxima since the start
//! of a session and derives reports from them on demand. [`ReportWindow`]
//! averages frames over short windows for live display.

use chrono::{DateTime, Utc};
use frameperf_shared::{
    EstimatedMemory, FrameLog, FrameSample, GlAverages, LogValues, Maxima, RenderCounters, Report,
    RendererInfo,
};

/// Draw counter sums
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GlTotals {
    calls: u64,
    triangles: u64,
    points: u64,
    lines: u64,
}

/// Running statistics since session start
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    started_at: DateTime<Utc>,
    started_ms: f64,
    total_frames: u64,
    means: LogValues,
    gl: GlTotals,
    max: Maxima,
}

impl SessionAccumulator {
    /// Start a session at monotonic time `now_ms`
    pub fn new(now_ms: f64) -> Self {
        Self {
            started_at: Utc::now(),
            started_ms: now_ms,
            total_frames: 0,
            means: LogValues::default(),
            gl: GlTotals::default(),
            max: Maxima::default(),
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Fold one completed frame into the session
    pub fn on_frame(&mut self, sample: &FrameSample, counters: &RenderCounters) {
        self.total_frames += 1;
        let n = self.total_frames as f64;

        // Incremental means: a constant input yields exactly that constant
        self.means.gpu += (sample.gpu - self.means.gpu) / n;
        self.means.cpu += (sample.cpu - self.means.cpu) / n;
        self.means.mem += (sample.mem - self.means.mem) / n;
        self.means.fps += (sample.fps - self.means.fps) / n;

        self.gl.calls += counters.calls;
        self.gl.triangles += counters.triangles;
        self.gl.points += counters.points;
        self.gl.lines += counters.lines;

        let max = &mut self.max;
        max.log.gpu = max.log.gpu.max(sample.gpu);
        max.log.cpu = max.log.cpu.max(sample.cpu);
        max.log.mem = max.log.mem.max(sample.mem);
        max.log.fps = max.log.fps.max(sample.fps);
        max.gl.calls = max.gl.calls.max(counters.calls);
        max.gl.triangles = max.gl.triangles.max(counters.triangles);
        max.gl.points = max.gl.points.max(counters.points);
        max.gl.lines = max.gl.lines.max(counters.lines);
    }

    /// Per-frame averages; all 0 before the first frame
    pub fn log_averages(&self) -> LogValues {
        self.means
    }

    /// Per-frame draw counter averages; all 0 before the first frame
    pub fn gl_averages(&self) -> GlAverages {
        if self.total_frames == 0 {
            return GlAverages::default();
        }
        let n = self.total_frames as f64;
        GlAverages {
            calls: self.gl.calls as f64 / n,
            triangles: self.gl.triangles as f64 / n,
            points: self.gl.points as f64 / n,
            lines: self.gl.lines as f64 / n,
        }
    }

    pub fn maxima(&self) -> Maxima {
        self.max
    }

    /// Seconds between session start and `now_ms`
    pub fn elapsed_secs(&self, now_ms: f64) -> f64 {
        ((now_ms - self.started_ms) / 1000.0).max(0.0)
    }

    /// Derive a report; does not modify the session
    pub fn report(&self, now_ms: f64, infos: &RendererInfo, memory: EstimatedMemory) -> Report {
        Report {
            started_at: self.started_at,
            session_time: self.elapsed_secs(now_ms),
            infos: infos.clone(),
            memory,
            log: self.log_averages(),
            gl: self.gl_averages(),
            max: self.max,
            max_memory: self.max.log.mem,
            total_frames: self.total_frames,
        }
    }

    /// Start a new session at `now_ms`
    pub fn reset(&mut self, now_ms: f64) {
        *self = Self::new(now_ms);
    }
}

/// Averages frames over windows of `1000 / reports_per_second` milliseconds
#[derive(Debug, Clone)]
pub struct ReportWindow {
    interval_ms: f64,
    window_start: f64,
    frames: u64,
    sums: LogValues,
    max_memory: f64,
    current: FrameLog,
}

impl ReportWindow {
    /// A rate of 0 is treated as 1
    pub fn new(reports_per_second: u32, now_ms: f64) -> Self {
        Self {
            interval_ms: 1000.0 / reports_per_second.max(1) as f64,
            window_start: now_ms,
            frames: 0,
            sums: LogValues::default(),
            max_memory: 0.0,
            current: FrameLog::default(),
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Last flushed window
    pub fn current(&self) -> FrameLog {
        self.current
    }

    /// Add a frame completed at `now_ms`; returns the window when it closes
    pub fn record(&mut self, sample: &FrameSample, now_ms: f64) -> Option<FrameLog> {
        self.frames += 1;
        self.sums.gpu += sample.gpu;
        self.sums.cpu += sample.cpu;
        self.sums.mem += sample.mem;
        self.max_memory = self.max_memory.max(sample.mem);

        let duration = now_ms - self.window_start;
        if duration < self.interval_ms {
            return None;
        }

        let n = self.frames as f64;
        self.current = FrameLog {
            cpu: self.sums.cpu / n,
            gpu: self.sums.gpu / n,
            mem: self.sums.mem / n,
            fps: if duration > 0.0 { n * 1000.0 / duration } else { 0.0 },
            duration_ms: duration.round(),
            frame_count: self.frames,
            max_memory: self.max_memory,
        };

        self.window_start = now_ms;
        self.frames = 0;
        self.sums = LogValues::default();
        Some(self.current)
    }

    /// Zero the displayed values (rendering stopped)
    pub fn clear(&mut self) {
        self.current = FrameLog::default();
    }

    /// Restart windowing at `now_ms`
    pub fn reset(&mut self, now_ms: f64) {
        self.window_start = now_ms;
        self.frames = 0;
        self.sums = LogValues::default();
        self.max_memory = 0.0;
        self.current = FrameLog::default();
    }
}
