//! GPU timer query scheduling
//!
//! Every query object cycles through
//! `Idle -> Recording -> Pending -> Resolved -> Idle`:
//!
//! - [`QueryScheduler::begin`] takes an idle object (or creates one) and
//!   starts recording, stamped with the current frame index.
//! - [`QueryScheduler::end`] submits it and appends it to a FIFO pending
//!   queue.
//! - [`QueryScheduler::poll_once`] checks only the oldest pending query. When
//!   its result is available the duration is emitted for the frame the query
//!   was issued on and the object goes back to the idle pool.
//!
//! Nothing here ever waits on the GPU. The pending queue is bounded; when it
//! overflows the oldest query is evicted and the last known duration is
//! attributed to its frame.

use std::collections::VecDeque;

use frameperf_shared::FrameIndex;
use tracing::{debug, info, warn};

use crate::metrics::GpuTimingStats;
use crate::{GpuError, GpuTimerBackend, GpuTiming, QueryHandle, QueryPoll, TimingSource};

/// Default bound of the pending queue
pub const DEFAULT_MAX_PENDING: usize = 4;

/// Whether the scheduler is currently producing GPU timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingMode {
    /// Queries are issued and polled
    Active,

    /// Timer queries are unavailable; GPU time reads 0
    Unsupported,

    /// Context lost; waiting for the backend to report restoration
    ContextLost,

    /// Released; no further calls are accepted
    Disposed,
}

/// A query that has been issued but not consumed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub handle: QueryHandle,
    pub frame: FrameIndex,
    pub label: String,
}

/// Schedules GPU timer queries across frames
pub struct QueryScheduler<B: GpuTimerBackend> {
    backend: B,
    idle: Vec<QueryHandle>,
    recording: Option<PendingQuery>,
    pending: VecDeque<PendingQuery>,
    max_pending: usize,
    mode: TimingMode,
    last_gpu_ms: f64,
    stats: GpuTimingStats,
}

impl<B: GpuTimerBackend> QueryScheduler<B> {
    /// Create a scheduler over `backend`. A bound of 0 is raised to 1.
    pub fn new(backend: B, max_pending: usize) -> Self {
        let mut scheduler = Self {
            backend,
            idle: Vec::new(),
            recording: None,
            pending: VecDeque::with_capacity(max_pending.max(1) + 1),
            max_pending: max_pending.max(1),
            mode: TimingMode::Active,
            last_gpu_ms: 0.0,
            stats: GpuTimingStats::new(),
        };
        scheduler.mode = scheduler.detect_mode();
        scheduler
    }

    fn detect_mode(&self) -> TimingMode {
        if !self.backend.is_supported() {
            warn!("GPU timer queries unavailable, falling back to CPU-only timing");
            TimingMode::Unsupported
        } else if self.backend.is_context_lost() {
            warn!("GPU context lost at startup, GPU timing suspended");
            TimingMode::ContextLost
        } else {
            TimingMode::Active
        }
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == TimingMode::Active
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Queries submitted and waiting for their result
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingQuery> {
        self.pending.iter()
    }

    /// Query objects available for reuse
    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Most recently measured GPU duration; 0 while degraded
    pub fn last_gpu_ms(&self) -> f64 {
        self.last_gpu_ms
    }

    pub fn stats(&self) -> &GpuTimingStats {
        &self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Start timing `frame`.
    ///
    /// Returns `Ok(false)` without doing anything when a query is already
    /// recording or GPU timing is degraded.
    pub fn begin(&mut self, label: &str, frame: FrameIndex) -> Result<bool, GpuError> {
        match self.mode {
            TimingMode::Disposed => return Err(GpuError::Disposed),
            TimingMode::Active => {}
            _ => return Ok(false),
        }
        if let Some(current) = &self.recording {
            debug!(
                "query '{}' for frame {} still recording, ignoring begin('{}')",
                current.label, current.frame, label
            );
            return Ok(false);
        }

        let handle = match self.idle.pop() {
            Some(handle) => handle,
            None => match self.backend.create_query() {
                Ok(handle) => {
                    self.stats.created += 1;
                    handle
                }
                Err(e) => {
                    self.degrade(e);
                    return Ok(false);
                }
            },
        };

        if let Err(e) = self.backend.begin_query(handle) {
            self.idle.push(handle);
            self.degrade(e);
            return Ok(false);
        }

        self.stats.issued += 1;
        self.recording = Some(PendingQuery {
            handle,
            frame,
            label: label.to_string(),
        });
        Ok(true)
    }

    /// Submit the recording query.
    ///
    /// When the submission overflows the pending queue the oldest query is
    /// evicted and returned as a timing carrying the last known duration.
    pub fn end(&mut self, label: &str) -> Result<Option<GpuTiming>, GpuError> {
        if self.mode == TimingMode::Disposed {
            return Err(GpuError::Disposed);
        }
        let Some(query) = self.recording.take() else {
            return Ok(None);
        };
        if query.label != label {
            debug!("end('{}') closes query '{}'", label, query.label);
        }

        if let Err(e) = self.backend.end_query(query.handle) {
            self.idle.push(query.handle);
            self.degrade(e);
            return Ok(None);
        }

        self.pending.push_back(query);
        if self.pending.len() <= self.max_pending {
            return Ok(None);
        }

        let Some(oldest) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.backend.delete_query(oldest.handle);
        self.stats.evicted += 1;
        warn!(
            "GPU query for frame {} unresolved after {} newer submissions, evicting (degraded GPU timing)",
            oldest.frame, self.max_pending
        );
        Ok(Some(GpuTiming {
            frame: oldest.frame,
            gpu_ms: self.last_gpu_ms,
            source: TimingSource::Evicted,
        }))
    }

    /// Check the oldest pending query once.
    ///
    /// Also detects context loss and restoration.
    pub fn poll_once(&mut self) -> Option<GpuTiming> {
        match self.mode {
            TimingMode::Active => {}
            TimingMode::ContextLost => {
                if self.backend.is_supported() && !self.backend.is_context_lost() {
                    info!("GPU context restored, resuming GPU timing");
                    self.mode = TimingMode::Active;
                }
                return None;
            }
            TimingMode::Unsupported | TimingMode::Disposed => return None,
        }

        if self.backend.is_context_lost() {
            self.enter_context_lost();
            return None;
        }

        let handle = self.pending.front()?.handle;
        match self.backend.poll_query(handle) {
            Ok(QueryPoll::Pending) => None,
            Ok(QueryPoll::Ready { elapsed_ns }) => {
                let query = self.pending.pop_front()?;
                self.idle.push(query.handle);

                let gpu_ms = elapsed_ns as f64 / 1_000_000.0;
                self.last_gpu_ms = gpu_ms;
                self.stats.record_resolved(gpu_ms);
                Some(GpuTiming {
                    frame: query.frame,
                    gpu_ms,
                    source: TimingSource::Measured,
                })
            }
            Ok(QueryPoll::Disjoint) => {
                let query = self.pending.pop_front()?;
                debug!("disjoint GPU timing for frame {}, discarding", query.frame);
                self.idle.push(query.handle);
                self.stats.disjoint += 1;
                None
            }
            Err(e) => {
                self.degrade(e);
                None
            }
        }
    }

    /// Release every query and start over with a new pending bound, as for
    /// a new session
    pub fn restart(&mut self, max_pending: usize) {
        if self.mode == TimingMode::Disposed {
            return;
        }
        self.max_pending = max_pending.max(1);
        if self.mode == TimingMode::Active {
            self.release_all();
        } else {
            self.forget_all();
        }
        self.last_gpu_ms = 0.0;
        self.stats = GpuTimingStats::new();
        self.mode = self.detect_mode();
    }

    /// Release every query object, including those still pending. Calling
    /// this more than once is a no-op.
    pub fn dispose(&mut self) {
        if self.mode == TimingMode::Disposed {
            return;
        }
        if self.backend.is_context_lost() {
            self.forget_all();
        } else {
            self.release_all();
        }
        self.last_gpu_ms = 0.0;
        self.mode = TimingMode::Disposed;
        debug!("GPU query scheduler disposed");
    }

    fn degrade(&mut self, error: GpuError) {
        match error {
            GpuError::ContextLost => self.enter_context_lost(),
            GpuError::Unsupported => {
                warn!("GPU timer queries rejected by backend, falling back to CPU-only timing");
                self.release_all();
                self.last_gpu_ms = 0.0;
                self.mode = TimingMode::Unsupported;
            }
            GpuError::UnknownQuery(handle) => {
                // the backend dropped its objects; every handle we hold is stale
                warn!("backend no longer knows query {:?}, treating as context loss", handle);
                self.enter_context_lost();
            }
            other => warn!("GPU query error: {}", other),
        }
    }

    fn enter_context_lost(&mut self) {
        warn!(
            "GPU context lost, discarding {} pending queries",
            self.pending.len()
        );
        self.forget_all();
        self.last_gpu_ms = 0.0;
        self.stats.context_losses += 1;
        self.mode = TimingMode::ContextLost;
    }

    /// Hand every query object back to the backend
    fn release_all(&mut self) {
        if let Some(query) = self.recording.take() {
            self.backend.delete_query(query.handle);
        }
        for query in self.pending.drain(..) {
            self.backend.delete_query(query.handle);
        }
        for handle in self.idle.drain(..) {
            self.backend.delete_query(handle);
        }
    }

    /// Drop handles the backend has already invalidated
    fn forget_all(&mut self) {
        self.recording = None;
        self.pending.clear();
        self.idle.clear();
    }
}

impl<B: GpuTimerBackend> Drop for QueryScheduler<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedGpu;

    fn run_frame(scheduler: &mut QueryScheduler<SimulatedGpu>, frame: FrameIndex) -> Vec<GpuTiming> {
        let mut out = Vec::new();
        scheduler.begin("frame", frame).unwrap();
        out.extend(scheduler.end("frame").unwrap());
        out.extend(scheduler.poll_once());
        out
    }

    #[test]
    fn test_zero_delay_resolves_same_frame() {
        let gpu = SimulatedGpu::new(0).with_elapsed(|_| 2_000_000);
        let mut scheduler = QueryScheduler::new(gpu, DEFAULT_MAX_PENDING);

        let timings = run_frame(&mut scheduler, 0);
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].frame, 0);
        assert_eq!(timings[0].gpu_ms, 2.0);
        assert_eq!(timings[0].source, TimingSource::Measured);
        assert_eq!(scheduler.idle_len(), 1);
    }

    #[test]
    fn test_second_begin_is_ignored_while_recording() {
        let mut scheduler = QueryScheduler::new(SimulatedGpu::new(0), DEFAULT_MAX_PENDING);
        assert!(scheduler.begin("frame", 0).unwrap());
        assert!(!scheduler.begin("frame", 0).unwrap());
        assert_eq!(scheduler.stats().issued, 1);
    }

    #[test]
    fn test_end_without_begin_is_noop() {
        let mut scheduler = QueryScheduler::new(SimulatedGpu::new(0), DEFAULT_MAX_PENDING);
        assert_eq!(scheduler.end("frame").unwrap(), None);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn test_query_objects_are_reused() {
        let gpu = SimulatedGpu::new(1);
        let mut scheduler = QueryScheduler::new(gpu, DEFAULT_MAX_PENDING);
        for frame in 0..100 {
            run_frame(&mut scheduler, frame);
        }
        assert!(scheduler.stats().created <= 2);
        assert_eq!(scheduler.stats().resolved, 99);
    }

    #[test]
    fn test_stalled_gpu_bounds_pending_queue() {
        let gpu = SimulatedGpu::new(0).with_stall(true);
        let mut scheduler = QueryScheduler::new(gpu, 4);

        let mut evicted = Vec::new();
        for frame in 0..10 {
            evicted.extend(run_frame(&mut scheduler, frame));
            assert!(scheduler.pending_len() <= 4);
        }

        assert_eq!(evicted.len(), 6);
        assert!(evicted.iter().all(|t| t.source == TimingSource::Evicted));
        let frames: Vec<_> = evicted.iter().map(|t| t.frame).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(scheduler.stats().evicted, 6);
        assert_eq!(scheduler.backend().live_queries(), 4);
    }

    #[test]
    fn test_fifo_consumption_with_out_of_order_completion() {
        // frame 0 takes three frames to resolve, frame 1 resolves at once
        let gpu = SimulatedGpu::new(0)
            .with_delays(|seq| if seq == 0 { 3 } else { 0 })
            .with_elapsed(|seq| (seq + 1) * 1_000_000);
        let mut scheduler = QueryScheduler::new(gpu, 8);

        let mut timings = Vec::new();
        for frame in 0..6 {
            timings.extend(run_frame(&mut scheduler, frame));
        }

        let frames: Vec<_> = timings.iter().map(|t| t.frame).collect();
        assert_eq!(frames[..2], [0, 1]);
        assert_eq!(timings[0].gpu_ms, 1.0);
        assert_eq!(timings[1].gpu_ms, 2.0);
    }

    #[test]
    fn test_unsupported_backend_falls_back() {
        let mut scheduler = QueryScheduler::new(SimulatedGpu::unsupported(), DEFAULT_MAX_PENDING);
        assert_eq!(scheduler.mode(), TimingMode::Unsupported);
        assert!(!scheduler.begin("frame", 0).unwrap());
        assert_eq!(scheduler.end("frame").unwrap(), None);
        assert_eq!(scheduler.poll_once(), None);
        assert_eq!(scheduler.last_gpu_ms(), 0.0);
    }

    #[test]
    fn test_context_loss_and_restore() {
        let gpu = SimulatedGpu::new(2).with_elapsed(|_| 3_000_000);
        let mut scheduler = QueryScheduler::new(gpu, DEFAULT_MAX_PENDING);
        for frame in 0..5 {
            run_frame(&mut scheduler, frame);
        }
        assert_eq!(scheduler.last_gpu_ms(), 3.0);

        scheduler.backend_mut().lose_context();
        assert_eq!(run_frame(&mut scheduler, 5), Vec::new());
        assert_eq!(scheduler.mode(), TimingMode::ContextLost);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(scheduler.idle_len(), 0);
        assert_eq!(scheduler.last_gpu_ms(), 0.0);
        assert_eq!(scheduler.stats().context_losses, 1);

        scheduler.backend_mut().restore_context();
        run_frame(&mut scheduler, 6);
        assert!(scheduler.is_active());

        let mut resolved = Vec::new();
        for frame in 7..12 {
            resolved.extend(run_frame(&mut scheduler, frame));
        }
        assert!(resolved.iter().all(|t| t.frame >= 7));
        assert!(!resolved.is_empty());
        assert_eq!(scheduler.backend().double_deletes(), 0);
    }

    #[test]
    fn test_loss_and_restore_between_polls_recovers() {
        let gpu = SimulatedGpu::new(1).with_elapsed(|_| 4_000_000);
        let mut scheduler = QueryScheduler::new(gpu, DEFAULT_MAX_PENDING);
        for frame in 0..5 {
            run_frame(&mut scheduler, frame);
        }
        assert_eq!(scheduler.last_gpu_ms(), 4.0);
        assert!(scheduler.idle_len() > 0);

        // never observed by poll_once: only stale handles betray the loss
        scheduler.backend_mut().lose_context();
        scheduler.backend_mut().restore_context();

        assert_eq!(run_frame(&mut scheduler, 5), Vec::new());
        assert_eq!(scheduler.last_gpu_ms(), 0.0);
        assert_eq!(scheduler.idle_len(), 0);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(scheduler.stats().context_losses, 1);
        assert!(scheduler.is_active());

        let issued = scheduler.stats().issued;
        let mut resolved = Vec::new();
        for frame in 6..50 {
            resolved.extend(run_frame(&mut scheduler, frame));
        }
        assert!(scheduler.stats().issued > issued);
        assert!(!resolved.is_empty());
        assert!(resolved.iter().all(|t| t.frame >= 6 && t.gpu_ms == 4.0));
        assert_eq!(scheduler.last_gpu_ms(), 4.0);
        assert_eq!(scheduler.backend().double_deletes(), 0);
    }

    #[test]
    fn test_unknown_pending_query_resets_queries() {
        let gpu = SimulatedGpu::new(3);
        let mut scheduler = QueryScheduler::new(gpu, DEFAULT_MAX_PENDING);
        for frame in 0..2 {
            run_frame(&mut scheduler, frame);
        }
        assert_eq!(scheduler.idle_len(), 0);
        assert_eq!(scheduler.pending_len(), 2);

        scheduler.backend_mut().lose_context();
        scheduler.backend_mut().restore_context();

        // begin gets a fresh object; the poll hits a stale pending one
        run_frame(&mut scheduler, 2);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(scheduler.mode(), TimingMode::ContextLost);

        run_frame(&mut scheduler, 3);
        assert!(scheduler.is_active());
        assert_eq!(scheduler.backend().double_deletes(), 0);
    }

    #[test]
    fn test_dispose_twice_releases_once() {
        let gpu = SimulatedGpu::new(3);
        let mut scheduler = QueryScheduler::new(gpu, DEFAULT_MAX_PENDING);
        for frame in 0..3 {
            run_frame(&mut scheduler, frame);
        }
        scheduler.begin("frame", 3).unwrap();

        scheduler.dispose();
        scheduler.dispose();

        assert_eq!(scheduler.mode(), TimingMode::Disposed);
        assert_eq!(scheduler.backend().live_queries(), 0);
        assert_eq!(scheduler.backend().double_deletes(), 0);
        assert_eq!(scheduler.begin("frame", 4), Err(GpuError::Disposed));
        assert_eq!(scheduler.end("frame"), Err(GpuError::Disposed));
    }

    #[test]
    fn test_restart_releases_queries() {
        let mut scheduler = QueryScheduler::new(SimulatedGpu::new(2), DEFAULT_MAX_PENDING);
        for frame in 0..4 {
            run_frame(&mut scheduler, frame);
        }
        scheduler.restart(2);
        assert_eq!(scheduler.max_pending(), 2);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(scheduler.backend().live_queries(), 0);
        assert_eq!(scheduler.stats().issued, 0);
        assert!(scheduler.is_active());
    }
}
