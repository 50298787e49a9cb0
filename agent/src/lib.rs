//! Frame telemetry engine
//!
//! This library hosts [`PerfEngine`], which a render loop drives through two
//! hooks per frame, plus its configuration, the per-frame collectors and a
//! simulated render host for tests and the CLI.

pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod output;
pub mod overclock;
pub mod simulate;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, FramePhase, PerfEngine};
pub use error::EngineError;
pub use events::{ListenerId, LogEmitter};
pub use overclock::{IdleRequestId, IdleScheduler};
pub use simulate::SimulatedScene;
