//! GPU timing
//!
//! GPU timer queries complete asynchronously, one or more frames after they
//! were issued. This crate schedules them across frames and turns their
//! results into per-frame GPU durations without ever blocking the render
//! loop.

pub mod metrics;
pub mod scheduler;
pub mod simulated;

pub use metrics::GpuTimingStats;
pub use scheduler::{QueryScheduler, TimingMode, DEFAULT_MAX_PENDING};
pub use simulated::SimulatedGpu;

use frameperf_shared::FrameIndex;
use thiserror::Error;

/// Opaque handle of a backend query object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// Availability of a submitted query's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPoll {
    /// Result not available yet
    Pending,

    /// Result available
    Ready { elapsed_ns: u64 },

    /// The GPU reported a disjoint event; the result is meaningless
    Disjoint,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("GPU timer queries are not supported")]
    Unsupported,

    #[error("GPU context lost")]
    ContextLost,

    #[error("unknown query handle {0:?}")]
    UnknownQuery(QueryHandle),

    #[error("query scheduler has been disposed")]
    Disposed,
}

/// A source of GPU timer queries
pub trait GpuTimerBackend {
    /// Whether timer queries are available at all
    fn is_supported(&self) -> bool;

    /// Whether the GPU context is currently lost
    fn is_context_lost(&self) -> bool;

    fn create_query(&mut self) -> Result<QueryHandle, GpuError>;

    /// Start timing GPU work submitted from now on
    fn begin_query(&mut self, query: QueryHandle) -> Result<(), GpuError>;

    /// Stop timing and submit the query
    fn end_query(&mut self, query: QueryHandle) -> Result<(), GpuError>;

    /// Check a submitted query; must not block
    fn poll_query(&mut self, query: QueryHandle) -> Result<QueryPoll, GpuError>;

    fn delete_query(&mut self, query: QueryHandle);
}

impl<B: GpuTimerBackend + ?Sized> GpuTimerBackend for Box<B> {
    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    fn is_context_lost(&self) -> bool {
        (**self).is_context_lost()
    }

    fn create_query(&mut self) -> Result<QueryHandle, GpuError> {
        (**self).create_query()
    }

    fn begin_query(&mut self, query: QueryHandle) -> Result<(), GpuError> {
        (**self).begin_query(query)
    }

    fn end_query(&mut self, query: QueryHandle) -> Result<(), GpuError> {
        (**self).end_query(query)
    }

    fn poll_query(&mut self, query: QueryHandle) -> Result<QueryPoll, GpuError> {
        (**self).poll_query(query)
    }

    fn delete_query(&mut self, query: QueryHandle) {
        (**self).delete_query(query)
    }
}

/// Where a GPU duration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    /// Read back from a resolved query
    Measured,

    /// The query was evicted from a full pending queue; the duration is the
    /// last measured one
    Evicted,
}

/// GPU duration attributed to the frame whose query produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuTiming {
    /// Frame the query was issued on (not the frame it resolved on)
    pub frame: FrameIndex,
    pub gpu_ms: f64,
    pub source: TimingSource,
}
