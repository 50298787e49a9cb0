//! Shared types and utilities for frameperf
//!
//! This crate contains the data structures exchanged between the GPU query
//! scheduler, the aggregators and the engine, plus the boundary trait a
//! rendering host implements so the engine can read its counters and scene.

pub mod host;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use host::RenderHost;
pub use types::{events::*, profile::*, programs::*, scene::*};
