//! The per-frame telemetry engine
//!
//! The host calls [`PerfEngine::on_frame_begin`] and
//! [`PerfEngine::on_frame_end`] once per rendered frame, in that order, on
//! the render thread. Everything happens synchronously inside those two
//! calls: the CPU timer, the GPU query scheduler (which never waits on the
//! GPU), the chart buffer, the session accumulator and, at a lower cadence,
//! memory estimation and program attribution.

use frameperf_aggregator::metrics;
use frameperf_aggregator::{
    ChartBuffer, MemoryEstimator, ReportWindow, RescanOutcome, ResourceAggregator,
    SceneMemoryEstimator, SessionAccumulator,
};
use frameperf_gpu::{GpuTimerBackend, GpuTiming, QueryScheduler};
use frameperf_shared::utils::time::{Clock, MonotonicClock};
use frameperf_shared::{
    EstimatedMemory, FrameIndex, FrameLog, FrameSample, GlInfo, LogEvent, MaterialTag, Metric,
    ProgramRecord, RenderCounters, RenderHost, RendererInfo, Report,
};
use tracing::{debug, info, trace};

use crate::collector::{CpuTimer, MatrixCounts, MatrixHooks, ObserverSlot};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{ListenerId, LogEmitter};
use crate::overclock::{IdleScheduler, OverclockState};

const FRAME_LABEL: &str = "frame";

/// Where the engine is in the host's frame cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames
    Idle,

    /// `on_frame_begin` called, `on_frame_end` pending
    InFrame,

    /// Torn down; frame hooks are rejected
    Disposed,
}

/// Assembles a [`PerfEngine`] with non-default collaborators
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    estimator: Box<dyn MemoryEstimator>,
    idle: Option<Box<dyn IdleScheduler>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: Box::new(MonotonicClock::new()),
            estimator: Box::new(SceneMemoryEstimator::default()),
            idle: None,
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn estimator(mut self, estimator: impl MemoryEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    /// Needed for overclock measurements
    pub fn idle_scheduler(mut self, scheduler: impl IdleScheduler + 'static) -> Self {
        self.idle = Some(Box::new(scheduler));
        self
    }

    pub fn build<B: GpuTimerBackend>(self, backend: B) -> Result<PerfEngine<B>, EngineError> {
        self.config.validate()?;
        let config = self.config;
        let now = self.clock.now_ms();

        if config.overclock && self.idle.is_none() {
            debug!("overclock enabled without an idle scheduler, uncapped rate unavailable");
        }
        info!(
            "telemetry engine initialized: chart {}@{}Hz, gpu timing {}, deep analyze {}",
            config.chart_capacity,
            config.sample_hz,
            if config.track_gpu { "on" } else { "off" },
            if config.deep_analyze { "on" } else { "off" },
        );

        Ok(PerfEngine {
            gpu: QueryScheduler::new(backend, config.max_pending_queries),
            cpu: CpuTimer::new(),
            chart: ChartBuffer::new(config.chart_capacity, config.sample_hz),
            session: SessionAccumulator::new(now),
            window: ReportWindow::new(config.reports_per_second, now),
            resources: ResourceAggregator::new(),
            estimator: self.estimator,
            idle: self.idle,
            overclock: OverclockState::new(config.fps_limit),
            matrix: MatrixHooks::detached(),
            emitter: LogEmitter::new(),
            clock: self.clock,
            phase: FramePhase::Idle,
            paused: false,
            next_frame: 0,
            frame_begin_ms: now,
            last_frame_end_ms: now,
            memory: EstimatedMemory::default(),
            last_memory_ms: None,
            last_rescan_ms: None,
            rescan_requested: false,
            infos: None,
            last_counters: RenderCounters::default(),
            last_sample: None,
            last_gpu_timing: None,
            config,
        })
    }
}

/// Per-frame CPU/GPU/fps telemetry for one render loop
pub struct PerfEngine<B: GpuTimerBackend> {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    gpu: QueryScheduler<B>,
    cpu: CpuTimer,
    chart: ChartBuffer,
    session: SessionAccumulator,
    window: ReportWindow,
    resources: ResourceAggregator,
    estimator: Box<dyn MemoryEstimator>,
    idle: Option<Box<dyn IdleScheduler>>,
    overclock: OverclockState,
    matrix: MatrixHooks,
    emitter: LogEmitter,
    phase: FramePhase,
    paused: bool,
    next_frame: FrameIndex,
    frame_begin_ms: f64,
    last_frame_end_ms: f64,
    memory: EstimatedMemory,
    last_memory_ms: Option<f64>,
    last_rescan_ms: Option<f64>,
    rescan_requested: bool,
    infos: Option<RendererInfo>,
    last_counters: RenderCounters,
    last_sample: Option<FrameSample>,
    last_gpu_timing: Option<GpuTiming>,
}

impl<B: GpuTimerBackend> PerfEngine<B> {
    /// Engine with a monotonic clock, the scene memory estimator and no
    /// idle scheduler
    pub fn initialize(config: EngineConfig, backend: B) -> Result<Self, EngineError> {
        EngineBuilder::new(config).build(backend)
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Start a frame
    pub fn on_frame_begin(&mut self) -> Result<(), EngineError> {
        match self.phase {
            FramePhase::Disposed => {
                return Err(EngineError::InvalidState("frame begin after dispose"))
            }
            FramePhase::InFrame => {
                return Err(EngineError::InvalidState("frame begin while a frame is open"))
            }
            FramePhase::Idle => {}
        }

        let now = self.clock.now_ms();
        if self.paused {
            self.paused = false;
            self.window.reset(now);
            debug!("rendering resumed");
        }

        if self.config.track_gpu {
            self.gpu.begin(FRAME_LABEL, self.next_frame)?;
        }
        self.matrix.reset();
        self.frame_begin_ms = now;
        self.cpu.mark_start(now);
        self.phase = FramePhase::InFrame;
        Ok(())
    }

    /// Close the frame opened by [`PerfEngine::on_frame_begin`] and record it
    pub fn on_frame_end(&mut self, host: &mut dyn RenderHost) -> Result<FrameSample, EngineError> {
        match self.phase {
            FramePhase::Disposed => return Err(EngineError::InvalidState("frame end after dispose")),
            FramePhase::Idle => {
                return Err(EngineError::InvalidState(
                    "frame end without matching frame begin",
                ))
            }
            FramePhase::InFrame => {}
        }

        let gpu = self.collect_gpu()?;
        let now = self.clock.now_ms();
        let frame = self.next_frame;
        self.next_frame += 1;
        self.phase = FramePhase::Idle;

        let cpu = self.cpu.mark_end(now).unwrap_or(0.0);

        if self.infos.is_none() {
            let infos = host.renderer_info();
            info!(
                "renderer: {} ({}, {})",
                infos.renderer, infos.vendor, infos.version
            );
            self.infos = Some(infos);
        }
        self.refresh_memory(&*host, now);

        let interval = now - self.last_frame_end_ms;
        self.last_frame_end_ms = now;
        let fps = if interval > 0.0 { 1000.0 / interval } else { 0.0 };

        let sample = FrameSample {
            frame,
            cpu,
            gpu,
            mem: self.memory.ram,
            fps,
        };
        self.chart.push_frame(&sample);

        let counters = host.counters();
        self.session.on_frame(&sample, &counters);
        self.last_counters = counters;
        if let Some(log) = self.window.record(&sample, now) {
            trace!(
                "log window: {:.1} fps over {} frames, cpu {:.2} ms, gpu {:.2} ms",
                log.fps,
                log.frame_count,
                log.cpu,
                log.gpu
            );
        }
        metrics::record_frame(&sample);

        self.emitter.emit(&LogEvent {
            sample,
            gl: GlInfo::new(counters, host.resources()),
        });

        if self.config.deep_analyze {
            self.maybe_rescan(host, now);
        }
        if self.config.overclock {
            if let Some(idle) = self.idle.as_deref_mut() {
                self.overclock.after_frame(self.frame_begin_ms, cpu, idle);
            }
        }

        self.last_sample = Some(sample);
        Ok(sample)
    }

    fn collect_gpu(&mut self) -> Result<f64, EngineError> {
        if !self.config.track_gpu {
            return Ok(0.0);
        }

        let losses = self.gpu.stats().context_losses;
        if let Some(evicted) = self.gpu.end(FRAME_LABEL)? {
            metrics::GPU_QUERY_EVICTIONS.inc();
            self.last_gpu_timing = Some(evicted);
        }
        if let Some(timing) = self.gpu.poll_once() {
            trace!("gpu frame {} took {:.3} ms", timing.frame, timing.gpu_ms);
            self.last_gpu_timing = Some(timing);
        }
        let new_losses = self.gpu.stats().context_losses.saturating_sub(losses);
        if new_losses > 0 {
            metrics::GPU_CONTEXT_LOSSES.inc_by(new_losses as f64);
        }

        Ok(self.gpu.last_gpu_ms())
    }

    fn refresh_memory(&mut self, host: &dyn RenderHost, now: f64) {
        let due = match self.last_memory_ms {
            None => true,
            Some(last) => now - last >= self.config.memory_interval_ms as f64,
        };
        if !due {
            return;
        }
        let drawables = host.drawables();
        self.memory = self.estimator.estimate(&drawables);
        self.last_memory_ms = Some(now);
    }

    fn maybe_rescan(&mut self, host: &mut dyn RenderHost, now: f64) {
        let due = self.rescan_requested
            || match self.last_rescan_ms {
                None => true,
                Some(last) => now - last >= self.config.rescan_interval_ms as f64,
            };
        if !due {
            return;
        }
        self.rescan_requested = false;
        self.last_rescan_ms = Some(now);

        let outcome = self.resources.rescan(host);
        let label = match outcome {
            RescanOutcome::Replaced { .. } => "replaced",
            RescanOutcome::Unchanged { .. } => "unchanged",
        };
        metrics::PROGRAM_RESCANS.with_label_values(&[label]).inc();
        metrics::PROGRAMS.set(self.resources.programs().len() as f64);
    }

    /// Most recent chart sample of `metric`; 0 before the first frame
    pub fn latest(&self, metric: Metric) -> f64 {
        self.chart.latest(metric)
    }

    /// Chart history of `metric`, oldest first, always `chart_capacity` long
    pub fn history(&self, metric: Metric) -> Vec<f64> {
        self.chart.history(metric)
    }

    pub fn chart(&self) -> &ChartBuffer {
        &self.chart
    }

    /// Session report as of now
    pub fn report(&self) -> Report {
        let infos = self.infos.clone().unwrap_or_default();
        self.session.report(self.clock.now_ms(), &infos, self.memory)
    }

    /// Last flushed report window
    pub fn log(&self) -> FrameLog {
        self.window.current()
    }

    /// Program attribution; `None` unless deep analyze is enabled
    pub fn resource_snapshot(&self) -> Option<&[ProgramRecord]> {
        if !self.config.deep_analyze {
            return None;
        }
        Some(self.resources.programs())
    }

    /// Each program's share of the last frame's primitives, in percent
    pub fn program_shares(&self) -> Option<Vec<(MaterialTag, f64)>> {
        if !self.config.deep_analyze {
            return None;
        }
        Some(self.resources.shares(self.last_counters.total_primitives()))
    }

    /// Rescan programs at the end of the next frame
    pub fn trigger_rescan(&mut self) -> Result<(), EngineError> {
        if self.phase == FramePhase::Disposed {
            return Err(EngineError::InvalidState("rescan after dispose"));
        }
        if !self.config.deep_analyze {
            return Err(EngineError::InvalidState("deep analyze is disabled"));
        }
        self.rescan_requested = true;
        Ok(())
    }

    /// Count matrix updates through `slot`. Returns false when matrix update
    /// counting is disabled in the configuration.
    pub fn install_matrix_hooks(&mut self, slot: ObserverSlot) -> Result<bool, EngineError> {
        if self.phase == FramePhase::Disposed {
            return Err(EngineError::InvalidState("hook install after dispose"));
        }
        if !self.config.matrix_update {
            debug!("matrix update counting disabled, hooks not installed");
            return Ok(false);
        }
        self.matrix.install(slot);
        Ok(true)
    }

    /// Matrix updates counted since the current or last frame began
    pub fn matrix_counts(&self) -> MatrixCounts {
        self.matrix.counts()
    }

    /// The host stopped rendering. The next frame begin resumes.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        match self.phase {
            FramePhase::Disposed => return Err(EngineError::InvalidState("pause after dispose")),
            FramePhase::InFrame => {
                return Err(EngineError::InvalidState("pause while a frame is open"))
            }
            FramePhase::Idle => {}
        }
        if self.paused {
            return Ok(());
        }
        self.paused = true;
        self.window.clear();
        self.matrix.reset();
        self.cancel_idle();
        info!("rendering paused");
        Ok(())
    }

    /// Idle callback requested through the [`IdleScheduler`]. Returns the
    /// uncapped frame rate when a request was outstanding.
    pub fn on_idle(&mut self) -> Result<Option<f64>, EngineError> {
        if self.phase == FramePhase::Disposed {
            return Err(EngineError::InvalidState("idle callback after dispose"));
        }
        let uncapped = self.overclock.on_idle(self.clock.now_ms());
        if let Some(fps) = self.overclock.overclocking_fps() {
            trace!("overclocking at {:.1} fps", fps);
        }
        Ok(uncapped)
    }

    /// The uncapped frame rate, when it exceeds the display cap
    pub fn overclocking_fps(&self) -> Option<f64> {
        self.overclock.overclocking_fps()
    }

    /// Apply a new configuration. Returns true when a new session started.
    pub fn reconfigure(&mut self, config: EngineConfig) -> Result<bool, EngineError> {
        match self.phase {
            FramePhase::Disposed => {
                return Err(EngineError::InvalidState("reconfigure after dispose"))
            }
            FramePhase::InFrame => {
                return Err(EngineError::InvalidState("reconfigure while a frame is open"))
            }
            FramePhase::Idle => {}
        }
        config.validate()?;

        let new_session = self.config.starts_new_session(&config);
        let now = self.clock.now_ms();
        if new_session {
            if !self.chart.reconfigure(config.chart_capacity, config.sample_hz) {
                self.chart.clear();
            }
            self.session.reset(now);
            self.window = ReportWindow::new(config.reports_per_second, now);
            self.gpu.restart(config.max_pending_queries);
            self.last_gpu_timing = None;
            self.cancel_idle();
            self.overclock.reset(config.fps_limit);
            self.last_frame_end_ms = now;
            info!(
                "new session: chart {}@{}Hz, {} reports/s",
                config.chart_capacity, config.sample_hz, config.reports_per_second
            );
        } else if config.fps_limit != self.config.fps_limit {
            self.cancel_idle();
            self.overclock.reset(config.fps_limit);
        }

        if self.config.track_gpu && !config.track_gpu && !new_session {
            self.gpu.restart(config.max_pending_queries);
            self.last_gpu_timing = None;
        }
        if !config.deep_analyze {
            self.resources.clear();
        } else if !self.config.deep_analyze {
            self.rescan_requested = true;
        }
        if !config.matrix_update {
            self.matrix.uninstall();
        }

        self.config = config;
        Ok(new_session)
    }

    /// Register a listener for the per-frame log event
    pub fn on(&mut self, handler: impl FnMut(&LogEvent) + 'static) -> ListenerId {
        self.emitter.on(handler)
    }

    pub fn once(&mut self, handler: impl FnMut(&LogEvent) + 'static) -> ListenerId {
        self.emitter.once(handler)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_disposed(&self) -> bool {
        self.phase == FramePhase::Disposed
    }

    pub fn last_sample(&self) -> Option<FrameSample> {
        self.last_sample
    }

    /// Most recent resolved or evicted GPU timing, tagged with its frame
    pub fn last_gpu_timing(&self) -> Option<GpuTiming> {
        self.last_gpu_timing
    }

    pub fn memory(&self) -> EstimatedMemory {
        self.memory
    }

    pub fn renderer_info(&self) -> Option<&RendererInfo> {
        self.infos.as_ref()
    }

    pub fn gpu(&self) -> &QueryScheduler<B> {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut QueryScheduler<B> {
        &mut self.gpu
    }

    fn cancel_idle(&mut self) {
        if let Some(idle) = self.idle.as_deref_mut() {
            self.overclock.cancel(idle);
        }
    }

    /// Release every GPU query, cancel the idle request and restore host
    /// hooks. Calling this again is a no-op.
    pub fn dispose(&mut self) {
        if self.phase == FramePhase::Disposed {
            return;
        }
        self.gpu.dispose();
        self.cpu.cancel();
        self.cancel_idle();
        self.matrix.uninstall();
        self.emitter.clear();
        self.phase = FramePhase::Disposed;
        info!(
            "telemetry engine disposed after {} frames",
            self.session.total_frames()
        );
    }
}

impl<B: GpuTimerBackend> Drop for PerfEngine<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
