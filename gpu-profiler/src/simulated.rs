//! Simulated GPU timer backend
//!
//! Models a GPU whose query results become available a configurable number
//! of frames after submission. A frame boundary is inferred from every
//! `begin_query` call, matching a host that times exactly one region per
//! frame. Used by the CLI simulation and throughout the tests.

use std::collections::HashMap;

use crate::{GpuError, GpuTimerBackend, QueryHandle, QueryPoll};

type SequenceFn = Box<dyn Fn(u64) -> u64>;

#[derive(Debug, Clone, Copy)]
enum SimQuery {
    Created,
    Running { sequence: u64 },
    Submitted { ready_at: u64, elapsed_ns: u64 },
}

/// In-memory GPU timer backend with deterministic latency
pub struct SimulatedGpu {
    supported: bool,
    context_lost: bool,
    stalled: bool,
    frame: u64,
    sequence: u64,
    next_handle: u64,
    queries: HashMap<QueryHandle, SimQuery>,
    delay_for: SequenceFn,
    elapsed_for: SequenceFn,
    disjoint_every: Option<u64>,
    double_deletes: u64,
}

impl SimulatedGpu {
    /// Results become available `delay_frames` frames after submission
    pub fn new(delay_frames: u64) -> Self {
        Self {
            supported: true,
            context_lost: false,
            stalled: false,
            frame: 0,
            sequence: 0,
            next_handle: 1,
            queries: HashMap::new(),
            delay_for: Box::new(move |_| delay_frames),
            elapsed_for: Box::new(|_| 1_000_000),
            disjoint_every: None,
            double_deletes: 0,
        }
    }

    /// A backend without timer query support
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(0)
        }
    }

    /// GPU duration in nanoseconds for the n-th issued query (0-based)
    pub fn with_elapsed(mut self, elapsed: impl Fn(u64) -> u64 + 'static) -> Self {
        self.elapsed_for = Box::new(elapsed);
        self
    }

    /// Latency in frames for the n-th issued query (0-based)
    pub fn with_delays(mut self, delay: impl Fn(u64) -> u64 + 'static) -> Self {
        self.delay_for = Box::new(delay);
        self
    }

    /// Report a disjoint event for every n-th issued query
    pub fn with_disjoint_every(mut self, n: u64) -> Self {
        self.disjoint_every = Some(n.max(1));
        self
    }

    /// A stalled GPU never makes results available
    pub fn with_stall(mut self, stalled: bool) -> Self {
        self.stalled = stalled;
        self
    }

    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Invalidate every query object
    pub fn lose_context(&mut self) {
        self.context_lost = true;
        self.queries.clear();
    }

    pub fn restore_context(&mut self) {
        self.context_lost = false;
    }

    /// Query objects created and not deleted
    pub fn live_queries(&self) -> usize {
        self.queries.len()
    }

    /// Deletions of handles that were not live
    pub fn double_deletes(&self) -> u64 {
        self.double_deletes
    }

    /// Frames observed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn check_context(&self) -> Result<(), GpuError> {
        if !self.supported {
            Err(GpuError::Unsupported)
        } else if self.context_lost {
            Err(GpuError::ContextLost)
        } else {
            Ok(())
        }
    }
}

impl GpuTimerBackend for SimulatedGpu {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn create_query(&mut self) -> Result<QueryHandle, GpuError> {
        self.check_context()?;
        let handle = QueryHandle(self.next_handle);
        self.next_handle += 1;
        self.queries.insert(handle, SimQuery::Created);
        Ok(handle)
    }

    fn begin_query(&mut self, query: QueryHandle) -> Result<(), GpuError> {
        self.check_context()?;
        let sequence = self.sequence;
        let state = self
            .queries
            .get_mut(&query)
            .ok_or(GpuError::UnknownQuery(query))?;
        *state = SimQuery::Running { sequence };
        self.sequence += 1;
        self.frame += 1;
        Ok(())
    }

    fn end_query(&mut self, query: QueryHandle) -> Result<(), GpuError> {
        self.check_context()?;
        let frame = self.frame;
        let state = self
            .queries
            .get_mut(&query)
            .ok_or(GpuError::UnknownQuery(query))?;
        if let SimQuery::Running { sequence } = *state {
            let disjoint = self
                .disjoint_every
                .map(|n| (sequence + 1) % n == 0)
                .unwrap_or(false);
            *state = SimQuery::Submitted {
                ready_at: frame.saturating_add((self.delay_for)(sequence)),
                elapsed_ns: if disjoint {
                    u64::MAX
                } else {
                    (self.elapsed_for)(sequence)
                },
            };
        }
        Ok(())
    }

    fn poll_query(&mut self, query: QueryHandle) -> Result<QueryPoll, GpuError> {
        self.check_context()?;
        match self.queries.get(&query) {
            None => Err(GpuError::UnknownQuery(query)),
            Some(SimQuery::Submitted { ready_at, elapsed_ns }) => {
                if self.stalled || self.frame < *ready_at {
                    Ok(QueryPoll::Pending)
                } else if *elapsed_ns == u64::MAX {
                    Ok(QueryPoll::Disjoint)
                } else {
                    Ok(QueryPoll::Ready {
                        elapsed_ns: *elapsed_ns,
                    })
                }
            }
            Some(_) => Ok(QueryPoll::Pending),
        }
    }

    fn delete_query(&mut self, query: QueryHandle) {
        if self.queries.remove(&query).is_none() && !self.context_lost {
            self.double_deletes += 1;
        }
    }
}
