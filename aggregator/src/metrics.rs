//! Prometheus metrics for frame telemetry
//!
//! Passive mirrors of the engine's state, updated once per frame. Nothing in
//! the engine reads them back.

use frameperf_shared::FrameSample;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

// ── Frame metrics ───────────────────────────────────────────────────────────

pub static FRAMES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("frameperf_frames_total", "Completed frames observed").unwrap()
});

pub static FPS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("frameperf_fps", "Frame rate of the last completed frame").unwrap()
});

pub static CPU_MS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("frameperf_cpu_ms", "CPU time of the last completed frame").unwrap()
});

pub static GPU_MS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("frameperf_gpu_ms", "Most recently resolved GPU frame time").unwrap()
});

pub static FRAME_CPU_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "frameperf_frame_cpu_seconds",
        "CPU time per frame",
        vec![0.001, 0.002, 0.004, 0.008, 0.0167, 0.033, 0.066, 0.1, 0.25]
    )
    .unwrap()
});

// ── GPU query metrics ───────────────────────────────────────────────────────

pub static GPU_QUERY_EVICTIONS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "frameperf_gpu_query_evictions_total",
        "GPU timer queries dropped from a full pending queue"
    )
    .unwrap()
});

pub static GPU_CONTEXT_LOSSES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "frameperf_gpu_context_losses_total",
        "GPU context losses observed by the query scheduler"
    )
    .unwrap()
});

// ── Resource metrics ────────────────────────────────────────────────────────

pub static PROGRAM_RESCANS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "frameperf_program_rescans_total",
        "Program attribution rescans",
        &["outcome"]
    )
    .unwrap()
});

pub static PROGRAMS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("frameperf_programs", "Distinct programs attributed to materials").unwrap()
});

/// Mirror one completed frame
pub fn record_frame(sample: &FrameSample) {
    FRAMES_TOTAL.inc();
    FPS.set(sample.fps);
    CPU_MS.set(sample.cpu);
    GPU_MS.set(sample.gpu);
    FRAME_CPU_SECONDS.observe(sample.cpu / 1000.0);
}

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
