//! Simulate command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use frameperf_agent::output::json;
use frameperf_agent::{PerfEngine, SimulatedScene};
use frameperf_aggregator::metrics;
use frameperf_gpu::SimulatedGpu;
use frameperf_shared::utils::time::ManualClock;
use tracing::debug;

use crate::output;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of frames to render (takes precedence over --duration)
    #[arg(short, long)]
    pub frames: Option<u64>,

    /// Simulated wall time (e.g., "500ms", "5s", "1m")
    #[arg(short, long, default_value = "5s")]
    pub duration: String,

    /// Frame rate of the simulated display
    #[arg(long, default_value = "60")]
    pub target_fps: u32,

    /// CPU time spent per frame in milliseconds
    #[arg(long, default_value = "4.0")]
    pub cpu_ms: f64,

    /// Frames before a GPU timer query result becomes available
    #[arg(long, default_value = "2")]
    pub gpu_delay: u64,

    /// GPU time per frame in milliseconds
    #[arg(long, default_value = "6.0")]
    pub gpu_ms: f64,

    /// Meshes in the simulated scene
    #[arg(long, default_value = "24")]
    pub meshes: usize,

    /// Distinct materials shared by the meshes
    #[arg(long, default_value = "6")]
    pub materials: usize,

    /// Chart history length
    #[arg(long)]
    pub chart_len: Option<usize>,

    /// Chart sample rate in Hz
    #[arg(long)]
    pub hz: Option<u32>,

    /// Attribute draw cost to programs
    #[arg(long)]
    pub deep_analyze: bool,

    /// Disable GPU timer queries
    #[arg(long)]
    pub no_gpu: bool,

    /// TOML configuration file
    #[arg(short, long, env = "FRAMEPERF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write the session report as JSON
    #[arg(long)]
    pub json: Option<String>,

    /// Write the chart history as JSON
    #[arg(long)]
    pub chart_json: Option<String>,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Deterministic variation of +/-15% around `base`
fn wobble(base: f64, n: u64) -> f64 {
    base * (1.0 + 0.15 * (n as f64 * 0.7).sin())
}

fn frame_count(args: &SimulateArgs) -> Result<u64> {
    if let Some(frames) = args.frames {
        return Ok(frames);
    }
    let duration = frameperf_shared::utils::parse_duration(&args.duration)
        .context("Failed to parse duration")?;
    Ok((duration.as_secs_f64() * args.target_fps as f64).round() as u64)
}

pub fn run(args: SimulateArgs) -> Result<()> {
    if args.target_fps == 0 {
        anyhow::bail!("Target frame rate must be greater than 0");
    }
    let frames = frame_count(&args)?;
    if frames == 0 {
        anyhow::bail!("Nothing to simulate: 0 frames");
    }

    let mut config = super::config::load(args.config.as_ref())?;
    if let Some(len) = args.chart_len {
        config.chart_capacity = len;
    }
    if let Some(hz) = args.hz {
        config.sample_hz = hz;
    }
    if args.deep_analyze {
        config.deep_analyze = true;
    }
    if args.no_gpu {
        config.track_gpu = false;
    }
    config.fps_limit = args.target_fps;

    let interval_ms = 1000.0 / args.target_fps as f64;
    if args.cpu_ms > interval_ms {
        output::warning(&format!(
            "CPU time {:.2} ms exceeds the {:.2} ms frame interval",
            args.cpu_ms, interval_ms
        ));
    }

    let gpu_ms = args.gpu_ms.max(0.0);
    let gpu = SimulatedGpu::new(args.gpu_delay)
        .with_elapsed(move |seq| (wobble(gpu_ms, seq) * 1_000_000.0) as u64);
    let clock = ManualClock::new();
    let mut engine = PerfEngine::<SimulatedGpu>::builder(config)
        .clock(clock.clone())
        .build(gpu)
        .context("Failed to initialize telemetry engine")?;
    let mut scene = SimulatedScene::grid(args.meshes, args.materials);

    output::info(&format!(
        "Simulating {} frames at {} fps ({} meshes, {} materials)",
        frames, args.target_fps, args.meshes, args.materials
    ));

    for n in 0..frames {
        let cpu_ms = wobble(args.cpu_ms.max(0.0), n);
        engine.on_frame_begin()?;
        scene.render();
        clock.advance(cpu_ms);
        let sample = engine.on_frame_end(&mut scene)?;
        clock.advance(interval_ms - cpu_ms);

        if n % args.target_fps as u64 == 0 {
            debug!(
                "frame {}: {:.1} fps, cpu {:.2} ms, gpu {:.2} ms",
                sample.frame, sample.fps, sample.cpu, sample.gpu
            );
        }
    }

    let report = engine.report();
    output::report(&report);

    if let (Some(records), Some(shares)) = (engine.resource_snapshot(), engine.program_shares()) {
        output::programs(records, &shares);
    }

    if let Some(path) = &args.json {
        json::write_report(&report, path)?;
        output::success(&format!("Report written to {}", path));
    }
    if let Some(path) = &args.chart_json {
        json::write_chart(&engine.chart().snapshot(), path)?;
        output::success(&format!("Chart history written to {}", path));
    }
    if args.metrics {
        println!();
        print!("{}", metrics::encode_metrics());
    }

    engine.dispose();
    Ok(())
}
