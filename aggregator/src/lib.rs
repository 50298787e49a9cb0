//! Frame statistics aggregation
//!
//! Everything here is fed once per completed frame (or, for resources, at a
//! lower cadence) from the engine's frame-end hook:
//!
//! - [`buffer::ChartBuffer`]: fixed-length trailing history per metric
//! - [`aggregate::SessionAccumulator`]: running averages and maxima
//! - [`aggregate::ReportWindow`]: short window averages for live display
//! - [`resources::ResourceAggregator`]: per-program draw attribution
//! - [`memory`]: pluggable GPU memory estimation

pub mod aggregate;
pub mod buffer;
pub mod memory;
pub mod metrics;
pub mod resources;

pub use aggregate::{ReportWindow, SessionAccumulator};
pub use buffer::ChartBuffer;
pub use memory::{MemoryEstimator, SceneMemoryEstimator};
pub use resources::{RescanOutcome, ResourceAggregator};
