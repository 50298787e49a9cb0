//! Uncapped frame rate measurement
//!
//! A display-capped loop never runs faster than its refresh rate, so the
//! frame rate alone says nothing about headroom. With overclock enabled the
//! engine asks the host for a callback at the next idle point after each
//! frame; the time from frame begin to that idle point is the real cost of
//! the frame, and `1000 / cost` the rate the loop could sustain uncapped.
//!
//! This is advisory: it never suppresses or delays a frame sample.

use tracing::debug;

/// Identifier of an outstanding idle request
pub type IdleRequestId = u64;

/// Host facility for running work when the loop is idle
pub trait IdleScheduler {
    /// Ask for [`crate::PerfEngine::on_idle`] to be called at the next idle point
    fn request_idle(&mut self) -> IdleRequestId;

    fn cancel_idle(&mut self, id: IdleRequestId);
}

#[derive(Debug, Clone)]
pub struct OverclockState {
    fps_limit: u32,
    outstanding: Option<IdleRequestId>,
    frame_begin_ms: f64,
    uncapped_fps: f64,
    overclocking_fps: Option<f64>,
}

impl OverclockState {
    pub fn new(fps_limit: u32) -> Self {
        Self {
            fps_limit: fps_limit.max(1),
            outstanding: None,
            frame_begin_ms: 0.0,
            uncapped_fps: 0.0,
            overclocking_fps: None,
        }
    }

    pub fn budget_ms(&self) -> f64 {
        1000.0 / self.fps_limit as f64
    }

    pub fn outstanding(&self) -> Option<IdleRequestId> {
        self.outstanding
    }

    /// Last uncapped frame rate measured at an idle point
    pub fn uncapped_fps(&self) -> f64 {
        self.uncapped_fps
    }

    /// The uncapped rate, when it exceeds the display cap
    pub fn overclocking_fps(&self) -> Option<f64> {
        self.overclocking_fps
    }

    /// Request an idle callback for the frame that began at `frame_begin_ms`.
    /// Returns false when a request is already outstanding.
    pub fn after_frame(
        &mut self,
        frame_begin_ms: f64,
        cpu_ms: f64,
        scheduler: &mut dyn IdleScheduler,
    ) -> bool {
        if cpu_ms > self.budget_ms() {
            debug!(
                "frame cpu time {:.2} ms over the {:.2} ms budget",
                cpu_ms,
                self.budget_ms()
            );
        }
        if self.outstanding.is_some() {
            return false;
        }
        self.frame_begin_ms = frame_begin_ms;
        self.outstanding = Some(scheduler.request_idle());
        true
    }

    /// Consume the outstanding request; `None` when nothing was requested
    pub fn on_idle(&mut self, now_ms: f64) -> Option<f64> {
        self.outstanding.take()?;
        let busy = now_ms - self.frame_begin_ms;
        self.uncapped_fps = if busy > 0.0 { 1000.0 / busy } else { 0.0 };
        self.overclocking_fps = if self.uncapped_fps > self.fps_limit as f64 {
            Some(self.uncapped_fps)
        } else {
            None
        };
        Some(self.uncapped_fps)
    }

    pub fn cancel(&mut self, scheduler: &mut dyn IdleScheduler) {
        if let Some(id) = self.outstanding.take() {
            scheduler.cancel_idle(id);
            debug!("idle request {} cancelled", id);
        }
    }

    /// Forget measurements and adopt a new cap; call [`OverclockState::cancel`] first
    pub fn reset(&mut self, fps_limit: u32) {
        *self = Self::new(fps_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        next: IdleRequestId,
        requested: Vec<IdleRequestId>,
        cancelled: Vec<IdleRequestId>,
    }

    impl IdleScheduler for Recorder {
        fn request_idle(&mut self) -> IdleRequestId {
            self.next += 1;
            self.requested.push(self.next);
            self.next
        }

        fn cancel_idle(&mut self, id: IdleRequestId) {
            self.cancelled.push(id);
        }
    }

    #[test]
    fn test_uncapped_rate_above_limit() {
        let mut scheduler = Recorder::default();
        let mut state = OverclockState::new(60);

        assert!(state.after_frame(100.0, 2.0, &mut scheduler));
        assert!(!state.after_frame(116.0, 2.0, &mut scheduler));
        assert_eq!(scheduler.requested, vec![1]);

        assert_eq!(state.on_idle(104.0), Some(250.0));
        assert_eq!(state.overclocking_fps(), Some(250.0));
        assert_eq!(state.on_idle(105.0), None);
    }

    #[test]
    fn test_slow_frame_is_not_overclocking() {
        let mut scheduler = Recorder::default();
        let mut state = OverclockState::new(60);
        state.after_frame(0.0, 40.0, &mut scheduler);
        assert_eq!(state.on_idle(50.0), Some(20.0));
        assert_eq!(state.overclocking_fps(), None);
    }

    #[test]
    fn test_cancel_outstanding() {
        let mut scheduler = Recorder::default();
        let mut state = OverclockState::new(60);
        state.after_frame(0.0, 1.0, &mut scheduler);
        state.cancel(&mut scheduler);
        state.cancel(&mut scheduler);
        assert_eq!(scheduler.cancelled, vec![1]);
        assert_eq!(state.outstanding(), None);
    }
}
