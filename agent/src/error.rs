//! Engine error types

use frameperf_gpu::GpuError;
use thiserror::Error;

/// Errors returned to the host by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Call sequence the engine cannot honour (end without begin, use after
    /// dispose). Engine state is left untouched.
    #[error("invalid engine state: {0}")]
    InvalidState(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl EngineError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, EngineError::InvalidState(_))
    }
}
